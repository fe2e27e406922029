// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff.
//!
//! Three presets cover the crate's needs: [`RetryPolicy::startup`] fails
//! fast on bad connection config, [`RetryPolicy::publish`] gives a committed
//! tweet's event a short second chance, and [`RetryPolicy::forever`] keeps
//! the worker's consumer loop alive across broker restarts.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// `None` retries forever.
    pub max_attempts: Option<usize>,
}

impl RetryPolicy {
    /// Initial connections: a handful of attempts, done in seconds, so a
    /// typo in the environment surfaces at boot instead of hanging.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_attempts: Some(5),
        }
    }

    /// Post-commit event publish: the tweet is already durable, so a brief
    /// window of retries is worth it, but holding a task for minutes is not.
    #[must_use]
    pub fn publish() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_attempts: Some(3),
        }
    }

    /// Worker read loop: never give up, back off to a cap.
    #[must_use]
    pub fn forever() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            max_attempts: None,
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            factor: 2.0,
            max_attempts: Some(3),
        }
    }
}

/// Run `operation` until it succeeds or the policy's attempts run out.
pub async fn retry<F, Fut, T, E>(name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0usize;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = name, retries = attempt, "operation recovered");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;
                if let Some(max) = policy.max_attempts {
                    if attempt >= max {
                        return Err(err);
                    }
                    warn!(
                        operation = name,
                        attempt,
                        max,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "operation failed, retrying"
                    );
                } else {
                    warn!(
                        operation = name,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "operation failed, retrying indefinitely"
                    );
                }
                sleep(delay).await;
                delay = delay.mul_f64(policy.factor).min(policy.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_attempt_success() {
        let result: Result<u32, std::io::Error> =
            retry("ok", &RetryPolicy::test(), || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<&str, String> = retry("flaky", &RetryPolicy::test(), || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), String> = retry("dead", &RetryPolicy::test(), || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("always".to_string())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            factor: 10.0,
            max_attempts: Some(5),
        };
        let next = policy
            .initial_delay
            .mul_f64(policy.factor)
            .min(policy.max_delay);
        assert_eq!(next, Duration::from_secs(4));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::startup().max_attempts, Some(5));
        assert_eq!(RetryPolicy::publish().max_attempts, Some(3));
        assert!(RetryPolicy::forever().max_attempts.is_none());
    }
}
