//! Background sweep of expired authentication state.
//!
//! Nonces, capability cache entries and rate-limit windows all expire
//! lazily on access. Entries nobody touches again would stay in memory
//! forever, so this job periodically purges them. Redis-backed stores rely on
//! key TTLs and report nothing to remove.

use crate::auth::middleware::AppState;
use crate::storage::StoreError;
use std::time::Duration;

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub nonces: usize,
    pub capabilities: usize,
    pub rate_windows: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.nonces + self.capabilities + self.rate_windows
    }
}

/// Run the cleanup loop.
///
/// Sweeps every `interval`. Failures are logged and the loop keeps going.
pub async fn run_cleanup_loop(state: AppState, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        match sweep_expired(&state).await {
            Ok(report) if report.total() > 0 => {
                tracing::info!(
                    action = "cleanup",
                    nonces = report.nonces,
                    capabilities = report.capabilities,
                    rate_windows = report.rate_windows,
                    "Cleanup job completed"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Cleanup job failed"),
        }
    }
}

/// Purge expired nonces, cache entries and closed rate-limit windows.
pub async fn sweep_expired(state: &AppState) -> Result<SweepReport, CleanupError> {
    let nonces = state.auth.nonces.sweep().await?;
    let capabilities = state.auth.resolver.sweep();
    // Both limiters share one store
    let rate_windows = state.api_limiter.sweep().await?;

    Ok(SweepReport {
        nonces,
        capabilities,
        rate_windows,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
