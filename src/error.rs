use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the historical query client.
///
/// Only `RateLimited` is recoverable: the active walk sleeps out the reset
/// window and retries the same fetch. `Transient` and `Fatal` both end the
/// current walk with whatever was accumulated so far; they are kept distinct
/// so logging can tell a flaky network apart from a revoked credential.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The platform refused the request because the rate-limit window is
    /// exhausted. `reset_after` is the wait the platform asked for, when it
    /// supplied one.
    #[error("rate limit exceeded (reset in {reset_after:?})")]
    RateLimited { reset_after: Option<Duration> },

    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("fatal fetch failure: {0}")]
    Fatal(String),
}

/// Fatal configuration problems detected when a coordinator is built.
/// A channel with either of these cannot start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("channel #{channel_id} has no configuration")]
    MissingConfig { channel_id: i64 },

    #[error("channel #{channel_id} has no oauth token configuration")]
    MissingCredentials { channel_id: i64 },
}
