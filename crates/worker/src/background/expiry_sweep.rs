//! Periodic expiry of check-in requests left pending past their deadline.
//!
//! Approve, reject and cancel already expire a stale request when they touch
//! it; this job catches the ones nobody touches so staff queues stay clean.
//! Several workers may run it at once: each request is expired by exactly
//! one compare-and-set.

use std::time::Duration;

use covenant_core::checkin_request::CheckInRequestService;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered. The first sweep runs
/// immediately.
pub async fn run(requests: CheckInRequestService, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Check-in expiry sweep started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Check-in expiry sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match requests.sweep_expired().await {
                    Ok(0) => tracing::debug!("Expiry sweep: nothing to expire"),
                    Ok(expired) => tracing::info!(expired, "Expiry sweep: expired stale requests"),
                    Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                }
            }
        }
    }
}
