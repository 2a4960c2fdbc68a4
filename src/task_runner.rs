//! Periodic task runner with exponential backoff
//!
//! Runs one iteration of a background job per interval. Failures back off
//! exponentially; a task that keeps failing is reported and then retried
//! after the maximum delay.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay between successful iterations
    pub interval: Duration,
    /// Consecutive failures before the task is reported as degraded
    pub max_consecutive_failures: u32,
    /// Initial delay between retries
    pub initial_retry_delay: Duration,
    /// Maximum delay between retries
    pub max_retry_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_consecutive_failures: 5,
            initial_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct BackoffState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl BackoffState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    /// Returns the delay to wait before the next attempt.
    fn record_failure(&mut self, max_delay: Duration) -> Duration {
        self.consecutive_failures += 1;
        let delay = self.current_retry_delay;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
        delay
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Runs `task_fn` forever.
pub async fn run_with_backoff<F, Fut>(task_name: &str, config: BackoffConfig, mut task_fn: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut state = BackoffState::new(config.initial_retry_delay);
    info!("✓ Background task '{}' started", task_name);

    loop {
        match task_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(config.initial_retry_delay);
                sleep(config.interval).await;
            }
            Err(e) => {
                let delay = state.record_failure(config.max_retry_delay);
                error!(
                    "Task '{}' failed (attempt {}/{}): {}",
                    task_name, state.consecutive_failures, config.max_consecutive_failures, e
                );

                if state.consecutive_failures >= config.max_consecutive_failures {
                    error!(
                        "Task '{}' exceeded {} consecutive failures, cooling down for {:?}",
                        task_name, config.max_consecutive_failures, config.max_retry_delay
                    );
                    state.reset(config.initial_retry_delay);
                    sleep(config.max_retry_delay).await;
                } else {
                    warn!("Task '{}' will retry in {:?}", task_name, delay);
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config() -> BackoffConfig {
        BackoffConfig {
            interval: Duration::from_millis(5),
            max_consecutive_failures: 3,
            initial_retry_delay: Duration::from_millis(2),
            max_retry_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut state = BackoffState::new(Duration::from_millis(10));
        assert_eq!(state.record_failure(Duration::from_millis(30)), Duration::from_millis(10));
        assert_eq!(state.record_failure(Duration::from_millis(30)), Duration::from_millis(20));
        assert_eq!(state.record_failure(Duration::from_millis(30)), Duration::from_millis(30));
        assert_eq!(state.consecutive_failures, 3);

        state.reset(Duration::from_millis(10));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.current_retry_delay, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_task_recovers_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let handle = tokio::spawn(async move {
            run_with_backoff("recovering_task", fast_config(), || {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err("Simulated failure".to_string())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_always_failing_task_keeps_running() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let handle = tokio::spawn(async move {
            run_with_backoff("failing_task", fast_config(), || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("Always fails".to_string()) }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());
        handle.abort();

        assert!(attempts.load(Ordering::SeqCst) > 3);
    }
}
