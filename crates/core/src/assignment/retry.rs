//! Bounded retry loop for optimistic priority writes.
//!
//! Multi-row priority changes are applied in one transaction against a
//! unique `(organization_id, priority)` index. When two writers interleave,
//! one of them loses. The loser re-reads fresh priorities, re-plans and
//! tries again, up to [`RetryPolicy::max_attempts`] times.

use std::future::Future;
use std::time::Duration;

use crate::error::CoreError;

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Outcome of a single attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    /// Lost a race with a concurrent writer; nothing was committed.
    Conflict,
}

/// Run `attempt` until it reports [`Attempt::Done`] or the policy is exhausted.
///
/// `attempt` receives the 1-based attempt number and must start from a fresh
/// read every time. Errors other than a conflict are returned immediately.
/// Exhaustion yields [`CoreError::TransientUnavailable`] (converted into `E`).
pub async fn retry_on_conflict<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, E>
where
    E: From<CoreError>,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        match attempt(n).await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Conflict => {
                tracing::warn!(
                    attempt = n,
                    max_attempts,
                    operation,
                    "Priority write conflicted with a concurrent change"
                );
                if n < max_attempts && !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    tracing::error!(max_attempts, operation, "Priority retry bound exhausted");
    Err(CoreError::TransientUnavailable(format!(
        "{operation} kept conflicting with concurrent changes; retry the request"
    ))
    .into())
}
