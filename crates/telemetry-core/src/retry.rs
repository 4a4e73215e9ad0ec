// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded exponential backoff shared by network sends, snapshot file I/O and
//! database connection handling.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Wait before the first retry.
    pub initial_interval: Duration,
    pub multiplier: f64,
    /// Upper bound for a single wait.
    pub max_interval: Duration,
    /// Total time budget; no retry is scheduled past it.
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial_interval: Duration::from_secs(1),
            multiplier: 3.0,
            max_interval: Duration::from_secs(5),
            max_elapsed: Duration::from_secs(11),
        }
    }
}

impl BackoffPolicy {
    /// Interval following `current`, capped at `max_interval`.
    #[must_use]
    pub fn next_interval(&self, current: Duration) -> Duration {
        let next = current.mul_f64(self.multiplier);
        next.min(self.max_interval)
    }

    /// Runs `operation` until it succeeds, returns a non-transient error, or
    /// the next wait would exceed the elapsed-time budget. The last error is
    /// returned on exhaustion.
    pub async fn retry<T, E, F, Fut, P>(&self, mut operation: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        let mut interval = self.initial_interval.min(self.max_interval);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Operation succeeded after {attempt} attempts");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !is_transient(&err) {
                return Err(err);
            }
            if start.elapsed() + interval > self.max_elapsed {
                warn!(
                    "Giving up after {attempt} attempts in {} ms: {err}",
                    start.elapsed().as_millis()
                );
                return Err(err);
            }

            warn!(
                "Attempt {attempt} failed: {err}. Retrying in {} ms",
                interval.as_millis()
            );
            sleep(interval).await;
            interval = self.next_interval(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let first = policy.initial_interval;
        let second = policy.next_interval(first);
        let third = policy.next_interval(second);
        let fourth = policy.next_interval(third);
        assert_eq!(first, Duration::from_secs(1));
        assert_eq!(second, Duration::from_secs(3));
        assert_eq!(third, Duration::from_secs(5));
        assert_eq!(fourth, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let result: Result<(), String> = BackoffPolicy::default()
            .retry(
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err("connection refused".to_string())
                    }
                },
                |_| true,
            )
            .await;

        assert!(result.is_err());
        // attempts at t=0s, 1s, 4s, 9s; a further 5s wait would overrun 11s
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<u32, String> = BackoffPolicy::default()
            .retry(
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < 2 {
                            Err("timeout".to_string())
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), String> = BackoffPolicy::default()
            .retry(
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err("permission denied".to_string())
                    }
                },
                |_| false,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
