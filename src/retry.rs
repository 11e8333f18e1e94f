//! Rate-limit-aware retry around a single paginated fetch.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::FetchError;

/// Fallback wait when the platform signals a rate limit without saying when
/// the window resets.
pub const DEFAULT_RESET_WAIT: Duration = Duration::from_secs(60);

/// Outcome of a rate-limit-wrapped page fetch.
#[derive(Debug)]
pub enum WalkStep<T> {
    /// The fetch succeeded, possibly after waiting out rate limits.
    Page(T),
    /// The walk should end now, keeping whatever it accumulated so far.
    Stop,
}

/// Wraps page fetches with the platform's rate-limit protocol: a
/// `RateLimited` failure sleeps exactly the advertised reset duration and
/// re-invokes the same fetch; any other failure, or cancellation during the
/// sleep, ends the walk early. Rate limiting is never fatal, and no other
/// failure crashes the caller; partial backfill results are preserved.
pub struct RateLimitedWalker {
    cancel: CancellationToken,
}

impl RateLimitedWalker {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Fetches one page, absorbing rate limits. `what` names the listing for
    /// log lines.
    pub async fn fetch<T, F, Fut>(&self, what: &str, mut fetch: F) -> WalkStep<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        loop {
            if self.cancel.is_cancelled() {
                return WalkStep::Stop;
            }

            match fetch().await {
                Ok(page) => return WalkStep::Page(page),
                Err(FetchError::RateLimited { reset_after }) => {
                    let wait = reset_after.unwrap_or(DEFAULT_RESET_WAIT);
                    warn!("Rate limited while fetching {what}, sleeping {wait:?} until reset");

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            warn!("Cancelled while waiting out rate limit on {what}, ending walk");
                            return WalkStep::Stop;
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(err @ FetchError::Transient(_)) => {
                    warn!("Ending {what} walk with partial results: {err}");
                    return WalkStep::Stop;
                }
                Err(err @ FetchError::Fatal(_)) => {
                    error!("Ending {what} walk with partial results: {err}");
                    return WalkStep::Stop;
                }
            }
        }
    }
}
