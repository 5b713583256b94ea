//! Bounded readiness retry.
//!
//! Boot-time code waits for external services (database, cache) to report
//! readiness. Every wait is bounded twice: by a maximum number of probe
//! attempts and by an overall deadline. Expiry of either yields `false`
//! rather than an error.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Retry policy for readiness probes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of probe attempts (at least one probe always runs).
    pub max_attempts: u32,
    /// Delay after the first failed probe.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed probe.
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that waits the same `delay` between every attempt.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay to apply after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor as f64;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Probe until it reports `true`, attempts run out, or `deadline` elapses.
    ///
    /// A probe that hangs is cut off at the deadline.
    pub async fn wait_until<F, Fut>(&self, deadline: Duration, mut probe: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() && attempt > 0 {
                return false;
            }

            match tokio::time::timeout(remaining, probe()).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(_) => {
                    tracing::debug!(attempt, "readiness probe timed out");
                    return false;
                }
            }

            attempt += 1;
            if attempt >= self.max_attempts.max(1) {
                tracing::debug!(attempt, "readiness probe attempts exhausted");
                return false;
            }

            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return false;
            }
            tokio::time::sleep(self.delay_for(attempt - 1).min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(30), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_policy() {
        let policy = RetryPolicy::fixed(Duration::from_millis(250), 4);
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_succeeds_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 10);

        let probe_calls = Arc::clone(&calls);
        let ready = policy
            .wait_until(Duration::from_secs(5), move || {
                let probe_calls = Arc::clone(&probe_calls);
                async move { probe_calls.fetch_add(1, Ordering::SeqCst) >= 2 }
            })
            .await;

        assert!(ready);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 3);

        let probe_calls = Arc::clone(&calls);
        let ready = policy
            .wait_until(Duration::from_secs(60), move || {
                let probe_calls = Arc::clone(&probe_calls);
                async move {
                    probe_calls.fetch_add(1, Ordering::SeqCst);
                    false
                }
            })
            .await;

        assert!(!ready);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_respects_deadline() {
        let policy = RetryPolicy::fixed(Duration::from_millis(100), u32::MAX);
        let started = Instant::now();

        let ready = policy
            .wait_until(Duration::from_millis(350), || async { false })
            .await;

        assert!(!ready);
        assert!(started.elapsed() <= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_cut_off_at_deadline() {
        let policy = RetryPolicy::default();
        let ready = policy
            .wait_until(Duration::from_millis(50), || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                true
            })
            .await;
        assert!(!ready);
    }
}
