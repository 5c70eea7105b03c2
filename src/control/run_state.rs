//! 运行状态
//!
//! 进程级共享的两个标志位。只有 SignalMonitor 修改，流程在每个挂起点读取。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::sleep;

use crate::error::{AutomationError, Result};

#[derive(Debug)]
pub struct RunState {
    running: AtomicBool,
    paused: AtomicBool,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// 切换暂停状态，返回切换后的值
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    /// 暂停期间原地等待
    pub async fn block_while_paused(&self, interval: Duration) {
        while self.is_paused() && self.is_running() {
            sleep(interval).await;
        }
    }

    /// 挂起点：先等待暂停解除，再确认仍在运行
    pub async fn checkpoint(&self, interval: Duration) -> Result<()> {
        self.block_while_paused(interval).await;
        if self.is_running() {
            Ok(())
        } else {
            Err(AutomationError::FatalAbort)
        }
    }
}
