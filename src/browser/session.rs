//! 浏览器会话的唯一持有者
//!
//! 正常结束和热键终止都经过 [`BrowserSession::release`]。
//! `process::exit` 不会执行 Drop，所以终止钩子必须显式释放。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Browser;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 可以被关闭的浏览器进程
#[async_trait]
pub trait Shutdown: Send {
    async fn shutdown(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
impl Shutdown for Browser {
    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.close().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct BrowserSession {
    inner: Arc<Mutex<Option<Box<dyn Shutdown>>>>,
    /// 由本程序启动；连接到操作员已打开的浏览器时为 false
    launched: bool,
}

impl BrowserSession {
    pub fn new(browser: impl Shutdown + 'static, launched: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(browser)))),
            launched,
        }
    }

    /// 释放浏览器：自行启动的浏览器在 `timeout` 内关闭，连接模式只断开连接
    ///
    /// 可重复调用，第二次起为空操作。
    pub async fn release(&self, timeout: Duration) {
        let Some(mut browser) = self.inner.lock().await.take() else {
            return;
        };
        if !self.launched {
            debug!("连接模式：断开连接，保留浏览器窗口");
            return;
        }
        match tokio::time::timeout(timeout, browser.shutdown()).await {
            Ok(Ok(())) => info!("🧹 浏览器已关闭"),
            Ok(Err(e)) => warn!("⚠️ 关闭浏览器失败: {}", e),
            Err(_) => warn!("⚠️ 关闭浏览器超时 ({:?})", timeout),
        }
    }

    pub async fn is_released(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}
