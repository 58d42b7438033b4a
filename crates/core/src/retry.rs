//! Retry policy constants and backoff computation for unit-of-work
//! execution.
//!
//! Transient handler errors are retried a small bounded number of times
//! with exponential backoff before the owning job is failed. Lives in
//! `core` so both the engine and any future worker tooling agree on the
//! same policy.

use std::time::Duration;

/// Maximum attempts for a single unit of work (first try included).
pub const MAX_UNIT_ATTEMPTS: u32 = 3;

/// Base delay before the first retry.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on a single backoff delay.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Compute the backoff delay before retry number `attempt`.
///
/// `attempt` is 1-based: the delay after the first failure is
/// `RETRY_BASE_DELAY`, then it doubles per attempt, capped at
/// [`RETRY_MAX_DELAY`].
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    let delay = RETRY_BASE_DELAY.saturating_mul(1u32 << exp);
    delay.min(RETRY_MAX_DELAY)
}
