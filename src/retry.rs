//! 有界重试策略。
//! A bounded retry policy.
//!
//! The session layer never retries on its own. Callers wrap operations that
//! may fail transiently (`ConnectionLoss`, `OperationTimeout`) in
//! [`Retry::run`] or [`Retry::run_async`].
//!
//! 会话层本身从不重试。调用者将可能暂时失败的操作（`ConnectionLoss`、`OperationTimeout`）
//! 包装在 [`Retry::run`] 或 [`Retry::run_async`] 中。

use crate::{config::RetryConfig, error::Result};
use rand::Rng;
use std::{future::Future, time::Duration};
use tracing::debug;

/// Retries retryable errors with exponential backoff and jitter.
///
/// 以指数退避和随机抖动重试可重试的错误。
#[derive(Debug, Clone, PartialEq)]
pub struct Retry {
    max_retries: Option<u32>,
    config: RetryConfig,
}

impl Retry {
    /// `max_retries` counts retries after the first attempt; `None` is unbounded.
    /// `max_retries` 为首次尝试之后的重试次数；`None` 表示不设上限。
    pub fn new(max_retries: Option<u32>, config: RetryConfig) -> Self {
        Self {
            max_retries,
            config,
        }
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. Blocks the calling thread between attempts.
    ///
    /// 运行 `op`，直到成功、遇到不可重试的错误或重试次数耗尽。两次尝试之间阻塞调用线程。
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        let mut delay = self.config.initial_delay;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && self.may_retry(attempt) => {
                    attempt += 1;
                    let pause = self.jittered(delay);
                    debug!(attempt, error = %e, ?pause, "Retrying operation");
                    std::thread::sleep(pause);
                    delay = self.next_delay(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Async counterpart of [`Retry::run`]; sleeps with `tokio::time::sleep`.
    /// [`Retry::run`] 的异步版本；使用 `tokio::time::sleep` 休眠。
    pub async fn run_async<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut delay = self.config.initial_delay;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && self.may_retry(attempt) => {
                    attempt += 1;
                    let pause = self.jittered(delay);
                    debug!(attempt, error = %e, ?pause, "Retrying operation");
                    tokio::time::sleep(pause).await;
                    delay = self.next_delay(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn may_retry(&self, attempt: u32) -> bool {
        self.max_retries.is_none_or(|max| attempt < max)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        (delay * self.config.backoff).min(self.config.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.max_jitter <= 0.0 {
            return delay;
        }
        let factor = rand::rng().random_range(0.0..=self.config.max_jitter);
        delay + delay.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    fn fast(max_retries: Option<u32>) -> Retry {
        Retry::new(
            max_retries,
            RetryConfig {
                initial_delay: Duration::from_millis(1),
                backoff: 2,
                max_delay: Duration::from_millis(4),
                max_jitter: 0.0,
            },
        )
    }

    #[test]
    fn test_retries_transient_errors_until_success() {
        let mut calls = 0;
        let result = fast(Some(5)).run(|| {
            calls += 1;
            if calls < 3 {
                Err(Error::ConnectionLoss)
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_gives_up_after_budget_with_last_error() {
        let mut calls = 0;
        let result: Result<()> = fast(Some(2)).run(|| {
            calls += 1;
            Err(Error::OperationTimeout)
        });
        assert_eq!(result, Err(Error::OperationTimeout));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_errors_are_returned_immediately() {
        let mut calls = 0;
        let result: Result<()> = fast(None).run(|| {
            calls += 1;
            Err(Error::NoNode)
        });
        assert_eq!(result, Err(Error::NoNode));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let retry = fast(None);
        assert_eq!(retry.next_delay(Duration::from_millis(1)), Duration::from_millis(2));
        assert_eq!(retry.next_delay(Duration::from_millis(4)), Duration::from_millis(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_async_backs_off_on_virtual_time() {
        let retry = Retry::new(
            Some(3),
            RetryConfig {
                initial_delay: Duration::from_secs(1),
                backoff: 2,
                max_delay: Duration::from_secs(60),
                max_jitter: 0.0,
            },
        );
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let counter = calls.clone();
        let result = retry
            .run_async(|| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err(Error::ConnectionLoss) } else { Ok(n) }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        // 1s + 2s of backoff.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }
}
