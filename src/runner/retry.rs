use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::{BackoffKind, RetryConfig};
use crate::http::{Response, TransportError};

/// 重试间隔策略
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed,
    /// 第 n 次重试等待 delay * multiplier^n
    Exponential { multiplier: f64 },
}

/// 网络执行的重试策略
///
/// 只包裹发送请求这一步：连接失败、超时和配置的状态码视为瞬时故障，
/// 其余传输错误以及断言失败都不重试。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 首次请求之外的最大重试次数
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
    /// 在计算出的间隔上随机增加至多一半
    pub jitter: bool,
    pub retry_on_status: Vec<u16>,
}

#[derive(Debug, Clone)]
pub enum RetryFailure {
    /// 瞬时故障重试耗尽；若最后一次拿到了响应（可重试状态码）则一并保留
    Exhausted {
        last: String,
        response: Option<Response>,
    },
    /// 非瞬时传输错误，未重试
    Fatal(TransportError),
}

#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<Response, RetryFailure>,
    /// 实际发生的重试次数（成功时也会报告）
    pub retries: u32,
}

impl RetryPolicy {
    /// 不重试
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    /// 第 `retry` 次重试（从 0 开始）前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = self.delay.as_millis() as f64;
        let ms = match &self.backoff {
            Backoff::Fixed => base_ms,
            Backoff::Exponential { multiplier } => {
                base_ms * multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32)
            }
        };
        let mut ms = ms.min(self.max_delay.as_millis() as f64) as u64;

        if self.jitter && ms > 1 {
            ms += rand::rng().random_range(0..=ms / 2);
        }
        Duration::from_millis(ms)
    }

    /// 执行 `attempt`，按策略重试瞬时故障
    pub async fn execute<F, Fut>(&self, mut attempt: F) -> RetryOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Response, TransportError>>,
    {
        let mut retries = 0;

        loop {
            let (failure, response) = match attempt().await {
                Ok(response) if self.is_retryable_status(response.status.code()) => {
                    (format!("retryable status {}", response.status), Some(response))
                }
                Ok(response) => {
                    return RetryOutcome {
                        result: Ok(response),
                        retries,
                    };
                }
                Err(e) if e.is_transient() => (e.to_string(), None),
                Err(e) => {
                    debug!(error = %e, "non-transient transport error, not retrying");
                    return RetryOutcome {
                        result: Err(RetryFailure::Fatal(e)),
                        retries,
                    };
                }
            };

            if retries >= self.max_retries {
                return RetryOutcome {
                    result: Err(RetryFailure::Exhausted {
                        last: failure,
                        response,
                    }),
                    retries,
                };
            }

            let delay = self.delay_for(retries);
            retries += 1;
            warn!(
                attempt = retries,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                "transient failure: {}, retrying",
                failure
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                multiplier: config.multiplier,
            },
        };
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.delay_ms),
            backoff,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
            retry_on_status: config.retry_on_status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn response(status: u16) -> Response {
        Response::new(status, HeaderMap::new(), String::new(), Duration::ZERO).unwrap()
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_delay(Duration::ZERO)
    }

    /// 依次返回脚本中的结果
    async fn run_script(
        policy: &RetryPolicy,
        script: Vec<Result<Response, TransportError>>,
    ) -> (RetryOutcome, u32) {
        let script = Mutex::new(script.into_iter());
        let calls = AtomicU32::new(0);
        let outcome = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                let next = script.lock().unwrap().next();
                async move { next.unwrap_or_else(|| Ok(response(200))) }
            })
            .await;
        (outcome, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_succeeds_after_two_transient_failures() {
        let script = vec![
            Err(TransportError::Connect("refused".to_string())),
            Err(TransportError::Timeout("timed out".to_string())),
            Ok(response(200)),
        ];
        let (outcome, calls) = run_script(&policy(2), script).await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.retries, 2);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_failure() {
        let script = vec![
            Err(TransportError::Connect("refused".to_string())),
            Ok(response(503)),
        ];
        let (outcome, calls) = run_script(&policy(1), script).await;

        assert_eq!(calls, 2);
        assert_eq!(outcome.retries, 1);
        match outcome.result {
            Err(RetryFailure::Exhausted { last, response }) => {
                assert!(last.contains("503"));
                assert_eq!(response.map(|r| r.status.code()), Some(503));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let script = vec![Err(TransportError::InvalidRequest("bad header".to_string()))];
        let (outcome, calls) = run_script(&policy(3), script).await;

        assert_eq!(calls, 1);
        assert_eq!(outcome.retries, 0);
        assert!(matches!(outcome.result, Err(RetryFailure::Fatal(_))));
    }

    #[tokio::test]
    async fn test_non_retryable_status_is_returned() {
        let (outcome, calls) = run_script(&policy(3), vec![Ok(response(500))]).await;

        assert_eq!(calls, 1);
        assert_eq!(outcome.result.unwrap().status.code(), 500);
    }

    #[test]
    fn test_delay_fixed_and_exponential() {
        let fixed = RetryPolicy::default();
        assert_eq!(fixed.delay_for(0), Duration::from_secs(1));
        assert_eq!(fixed.delay_for(5), Duration::from_secs(1));

        let exponential = RetryPolicy {
            backoff: Backoff::Exponential { multiplier: 2.0 },
            delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            ..RetryPolicy::default()
        };
        assert_eq!(exponential.delay_for(0), Duration::from_millis(100));
        assert_eq!(exponential.delay_for(2), Duration::from_millis(400));
        assert_eq!(exponential.delay_for(10), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy {
            jitter: true,
            delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
