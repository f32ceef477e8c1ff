//! Check-in token generation.
//!
//! Tokens are the QR-code payload of a check-in request: 32 random bytes
//! from the thread-local CSPRNG, hex encoded.

use rand::Rng;

/// Random bytes per token (256 bits of entropy).
pub const TOKEN_BYTES: usize = 32;

/// Length of the encoded token string.
pub const TOKEN_LENGTH: usize = TOKEN_BYTES * 2;

/// Generate a fresh, unguessable check-in token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cheap shape check run before hitting the store.
///
/// Lookups stay exact and case-sensitive; this only rejects input that could
/// never have been issued.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LENGTH
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
