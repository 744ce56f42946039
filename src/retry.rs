use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

const PROBE_INTERVAL: Duration = Duration::from_secs(1);
const INIT_CONFIRM_ATTEMPTS: u32 = 15;
const INIT_CONFIRM_INTERVAL: Duration = Duration::from_secs(1);
const AUTH_READY_ATTEMPTS: u32 = 5;
const AUTH_READY_INTERVAL: Duration = Duration::from_secs(3);

/// Fixed-interval retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

/// Timing budget for every polling phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Interval between health reads of one node. The probe itself is unbounded.
    pub probe_interval: Duration,
    pub init_confirm: RetryPolicy,
    pub auth_ready: RetryPolicy,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            probe_interval: PROBE_INTERVAL,
            init_confirm: RetryPolicy {
                attempts: INIT_CONFIRM_ATTEMPTS,
                interval: INIT_CONFIRM_INTERVAL,
            },
            auth_ready: RetryPolicy {
                attempts: AUTH_READY_ATTEMPTS,
                interval: AUTH_READY_INTERVAL,
            },
        }
    }
}

/// Polls `check` until it returns `Ok(true)` or the budget runs out.
///
/// Errors from `check` count as a failed attempt and are logged, never
/// propagated. Returns whether the condition was met.
pub async fn poll_until<F, Fut>(policy: RetryPolicy, label: &str, mut check: F) -> bool
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    for attempt in 1..=policy.attempts {
        match check(attempt).await {
            Ok(true) => return true,
            Ok(false) => debug!(
                "{label}: condition not met (attempt {attempt}/{})",
                policy.attempts
            ),
            Err(err) => warn!(
                "{label}: attempt {attempt}/{} failed: {err:#}",
                policy.attempts
            ),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    false
}
