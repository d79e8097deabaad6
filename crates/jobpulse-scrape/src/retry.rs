//! Per-portal pacing and bounded retry around portal calls.
//!
//! The throttle's last-call timestamp is the only cross-call mutable state
//! in the scrape layer; workers sharing a portal serialize through its
//! mutex, so the delay window holds even with a pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::portal::{PortalError, PortalErrorKind};

/// Inter-request delay window; every call waits a fresh uniform draw from
/// `[min, max]` since the previous call through the same throttle.
#[derive(Debug, Clone, Copy)]
pub struct DelayWindow {
    pub min: Duration,
    pub max: Duration,
}

impl DelayWindow {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    /// A zero window, for tests and fixture runs.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn draw(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let millis = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(millis as u64)
    }
}

impl Default for DelayWindow {
    fn default() -> Self {
        // The original crawls politely at 5-10s between requests per portal.
        Self::new(Duration::from_secs(5), Duration::from_secs(10))
    }
}

/// Shared per-portal pacing state.
#[derive(Debug)]
pub struct PortalThrottle {
    window: DelayWindow,
    last_call: Mutex<Option<Instant>>,
}

impl PortalThrottle {
    pub fn new(window: DelayWindow) -> Self {
        Self {
            window,
            last_call: Mutex::new(None),
        }
    }

    /// Sleep until the jittered delay since the previous call has elapsed,
    /// then claim the slot. Holding the lock across the sleep serializes
    /// concurrent workers through the same window.
    pub async fn pause(&self) {
        let required = self.window.draw();
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < required {
                tokio::time::sleep(required - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total invocation ceiling for transiently failing calls.
    pub max_attempts: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Cooldown applied on an explicit throttling signal.
    pub rate_limit_cooldown: Duration,
    /// How many rate-limit cooldowns to tolerate before giving up.
    pub rate_limit_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(60),
            rate_limit_retries: 2,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base doubled per attempt, capped.
    pub fn backoff_delay(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }

    /// A policy with no waiting, for tests.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
            rate_limit_cooldown: Duration::ZERO,
            rate_limit_retries: 2,
        }
    }
}

/// Terminal outcome of a retried call.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Blocked or exhausted signals are final on first sight.
    #[error("terminal portal failure: {0}")]
    Terminal(PortalError),
    /// The attempt budget ran out.
    #[error("gave up after {attempts} attempts: {last}")]
    AttemptsExhausted { attempts: usize, last: PortalError },
}

/// Drives one portal's calls through its throttle and the retry policy.
pub struct RetryExecutor {
    policy: RetryPolicy,
    throttle: Arc<PortalThrottle>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, throttle: Arc<PortalThrottle>) -> Self {
        Self { policy, throttle }
    }

    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, PortalError>>,
    {
        let mut attempts = 0usize;
        let mut rate_limit_hits = 0usize;
        loop {
            attempts += 1;
            self.throttle.pause().await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => match err.kind {
                    PortalErrorKind::Blocked | PortalErrorKind::Exhausted => {
                        return Err(RetryError::Terminal(err));
                    }
                    PortalErrorKind::Transient => {
                        if attempts >= self.policy.max_attempts {
                            return Err(RetryError::AttemptsExhausted {
                                attempts,
                                last: err,
                            });
                        }
                        tracing::debug!(attempt = attempts, error = %err, "transient failure, backing off");
                        tokio::time::sleep(self.policy.backoff_delay(attempts - 1)).await;
                    }
                    PortalErrorKind::RateLimited => {
                        if rate_limit_hits >= self.policy.rate_limit_retries {
                            return Err(RetryError::AttemptsExhausted {
                                attempts,
                                last: err,
                            });
                        }
                        rate_limit_hits += 1;
                        tracing::warn!(error = %err, "rate limited, cooling down");
                        tokio::time::sleep(self.policy.rate_limit_cooldown).await;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor(max_attempts: usize) -> RetryExecutor {
        RetryExecutor::new(
            RetryPolicy::immediate(max_attempts),
            Arc::new(PortalThrottle::new(DelayWindow::none())),
        )
    }

    #[tokio::test]
    async fn succeeds_after_n_transient_failures_in_exactly_n_plus_one_calls() {
        let calls = AtomicUsize::new(0);
        let result = executor(3)
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PortalError::transient("connection reset"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_exactly_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = executor(3)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PortalError::transient("timeout")) }
            })
            .await;
        assert!(matches!(
            result,
            Err(RetryError::AttemptsExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn blocked_is_terminal_on_the_first_call() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = executor(5)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PortalError::blocked("403 forbidden")) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Terminal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limited_retries_a_bounded_number_of_times() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = executor(10)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PortalError::rate_limited("429")) }
            })
            .await;
        assert!(matches!(
            result,
            Err(RetryError::AttemptsExhausted { .. })
        ));
        // Two cooldown retries on top of the first call.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limit_then_success_recovers() {
        let calls = AtomicUsize::new(0);
        let result = executor(10)
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(PortalError::rate_limited("429"))
                    } else {
                        Ok("page")
                    }
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_millis(350),
            rate_limit_cooldown: Duration::ZERO,
            rate_limit_retries: 0,
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(350));
        assert_eq!(policy.backoff_delay(6), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn throttle_spaces_out_consecutive_calls() {
        let throttle = PortalThrottle::new(DelayWindow::new(
            Duration::from_millis(30),
            Duration::from_millis(40),
        ));
        throttle.pause().await;
        let start = Instant::now();
        throttle.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
