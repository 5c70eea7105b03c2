//! 重试策略
//!
//! 只用于时序敏感的瞬时失败（元素尚未出现、页面尚未稳定），不用来掩盖逻辑错误。

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// 单次退避的上限
pub const MAX_DELAY: Duration = Duration::from_secs(600);

/// 有限次数 + 指数退避
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub tries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(tries: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            tries,
            base_delay,
            backoff_factor,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.tries,
            Duration::from_millis(config.base_delay_ms),
            config.backoff_factor,
        )
    }

    /// 第 `attempt` 次失败后的等待时间：`base_delay * backoff_factor^(attempt-1)`，上限 `MAX_DELAY`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent).max(0.0);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY)
    }

    /// 任何错误都重试
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(op, |_| true).await
    }

    /// 仅在 `should_retry` 为真时重试，否则立即返回该错误
    pub async fn run_if<T, E, F, Fut, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let tries = self.tries.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < tries && should_retry(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "操作失败 (尝试 {}/{}), {:?} 后重试: {}",
                        attempt, tries, delay, e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("操作失败，不再重试 (尝试 {}/{}): {}", attempt, tries, e);
                    return Err(e);
                }
            }
        }
    }
}

/// 便捷函数：按给定参数执行带重试的操作
pub async fn with_retry<T, E, F, Fut>(
    operation: F,
    tries: u32,
    base_delay: Duration,
    backoff_factor: f64,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    RetryPolicy::new(tries, base_delay, backoff_factor)
        .run(operation)
        .await
}
