//! Long-running jobs spawned by the worker binary.
//!
//! Each job takes a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! and returns once it is cancelled.

pub mod expiry_sweep;
