//! 轮询调度
//!
//! 所有固定间隔等待（元素同步、下载检测、暂停检查、热键采样）都从这里取间隔，
//! 不在业务代码中散落字面量 sleep。

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::config::IntervalConfig;

/// 轮询间隔集合
#[derive(Debug, Clone)]
pub struct Schedule {
    pub locator_poll: Duration,
    pub download_poll: Duration,
    pub pause_poll: Duration,
    pub hotkey_sample: Duration,
    pub hotkey_debounce: Duration,
    /// 点击后等待页面稳定
    pub settle: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::from_config(&IntervalConfig::default())
    }
}

impl Schedule {
    pub fn from_config(intervals: &IntervalConfig) -> Self {
        Self {
            locator_poll: Duration::from_millis(intervals.locator_ms),
            download_poll: Duration::from_millis(intervals.download_ms),
            pause_poll: Duration::from_millis(intervals.pause_ms),
            hotkey_sample: Duration::from_millis(intervals.hotkey_sample_ms),
            hotkey_debounce: Duration::from_millis(intervals.hotkey_debounce_ms),
            settle: Duration::from_millis(intervals.settle_ms),
        }
    }

    /// 所有间隔统一设为 `step`（测试用）
    pub fn uniform(step: Duration) -> Self {
        Self {
            locator_poll: step,
            download_poll: step,
            pause_poll: step,
            hotkey_sample: step,
            hotkey_debounce: step,
            settle: step,
        }
    }

    pub async fn settle(&self) {
        sleep(self.settle).await;
    }
}

/// 以固定间隔反复调用 `probe`，直到返回 `Some` 或超时
///
/// `probe` 至少调用一次；超时返回 `Ok(None)`，错误立即向上传递。
pub async fn poll_until<T, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[tokio::test]
    async fn test_poll_until_returns_first_hit() {
        let mut calls = 0;
        let result: Result<Option<u32>, Infallible> =
            poll_until(Duration::from_millis(5), Duration::from_secs(2), || {
                calls += 1;
                let hit = if calls == 3 { Some(42) } else { None };
                async move { Ok(hit) }
            })
            .await;

        assert_eq!(result.unwrap(), Some(42));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let started = Instant::now();
        let result: Result<Option<()>, Infallible> =
            poll_until(Duration::from_millis(10), Duration::from_millis(50), || async {
                Ok(None)
            })
            .await;

        assert_eq!(result.unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_poll_until_propagates_error() {
        let result: Result<Option<()>, &str> =
            poll_until(Duration::from_millis(5), Duration::from_secs(1), || async {
                Err("boom")
            })
            .await;

        assert_eq!(result.unwrap_err(), "boom");
    }
}
