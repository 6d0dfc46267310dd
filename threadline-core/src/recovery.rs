//! Partial-failure isolation helpers.
//!
//! A failure scoped to a single node or a single avatar lookup must never
//! abort the surrounding aggregation. These helpers turn such a failure into a
//! degraded-but-present value and log it, so call sites stay linear.

use crate::{CoreError, ErrorExt, ThreadError};
use tracing::warn;

/// Outcome of an operation that is allowed to fall back to a degraded value
#[derive(Debug)]
pub enum RecoveryResult<T> {
    /// The operation succeeded
    Recovered(T),
    /// The operation failed and a fallback value was substituted
    Degraded(T),
}

impl<T> RecoveryResult<T> {
    /// Returns true if the operation succeeded without falling back
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryResult::Recovered(_))
    }

    /// Returns true if a fallback value was substituted
    pub fn is_degraded(&self) -> bool {
        matches!(self, RecoveryResult::Degraded(_))
    }

    /// Returns the held value regardless of how it was obtained
    pub fn into_inner(self) -> T {
        match self {
            RecoveryResult::Recovered(value) | RecoveryResult::Degraded(value) => value,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RecoveryResult<U> {
        match self {
            RecoveryResult::Recovered(value) => RecoveryResult::Recovered(f(value)),
            RecoveryResult::Degraded(value) => RecoveryResult::Degraded(f(value)),
        }
    }
}

/// Substitutes `fallback` for a failed result and logs the failure as a
/// [`ThreadError::PartialFetchFailure`] scoped to `target`.
pub fn degrade<T, F>(result: Result<T, CoreError>, target: &str, fallback: F) -> RecoveryResult<T>
where
    F: FnOnce() -> T,
{
    match result {
        Ok(value) => RecoveryResult::Recovered(value),
        Err(error) => {
            let partial = ThreadError::PartialFetchFailure {
                target: target.to_string(),
                reason: error.to_string(),
            };
            warn!(
                code = %error.error_code(),
                retryable = error.is_retryable(),
                "{}",
                partial
            );
            RecoveryResult::Degraded(fallback())
        }
    }
}
