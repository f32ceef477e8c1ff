use std::time::Duration;

use covenant_core::config::{CheckInPolicy, DEFAULT_REQUEST_TTL_MINUTES};

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Lifetime of a check-in request (default: `15` minutes).
    pub request_ttl_minutes: i64,
    /// How often expired requests are swept (default: `60` seconds).
    pub sweep_interval_secs: u64,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default  |
    /// |-------------------------------|----------|
    /// | `DATABASE_URL`                | required |
    /// | `CHECKIN_REQUEST_TTL_MINUTES` | `15`     |
    /// | `CHECKIN_SWEEP_INTERVAL_SECS` | `60`     |
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let request_ttl_minutes: i64 = std::env::var("CHECKIN_REQUEST_TTL_MINUTES")
            .unwrap_or_else(|_| DEFAULT_REQUEST_TTL_MINUTES.to_string())
            .parse()
            .expect("CHECKIN_REQUEST_TTL_MINUTES must be a valid i64");

        let sweep_interval_secs: u64 = std::env::var("CHECKIN_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("CHECKIN_SWEEP_INTERVAL_SECS must be a valid u64");

        assert!(
            request_ttl_minutes > 0,
            "CHECKIN_REQUEST_TTL_MINUTES must be positive"
        );
        assert!(
            sweep_interval_secs > 0,
            "CHECKIN_SWEEP_INTERVAL_SECS must be positive"
        );

        Self {
            database_url,
            request_ttl_minutes,
            sweep_interval_secs,
        }
    }

    pub fn policy(&self) -> CheckInPolicy {
        CheckInPolicy::with_ttl_minutes(self.request_ttl_minutes)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_uses_configured_ttl() {
        let config = WorkerConfig {
            database_url: "postgres://localhost/covenant".into(),
            request_ttl_minutes: 30,
            sweep_interval_secs: 10,
        };
        assert_eq!(config.policy().request_ttl, chrono::Duration::minutes(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(10));
    }
}
