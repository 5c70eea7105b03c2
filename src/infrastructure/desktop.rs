//! 桌面能力 - 基础设施层
//!
//! 浏览器交给原生对话框 / PDF 查看器之后，DOM 不再可用，
//! 只能通过屏幕截图和键鼠模拟继续操作。

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use rdev::{Button, EventType, Key};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{AutomationError, Result};

/// 屏幕坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// 一次屏幕截图及其在虚拟桌面中的原点
#[derive(Debug, Clone)]
pub struct Screen {
    pub image: RgbaImage,
    pub origin: (i32, i32),
}

impl Screen {
    pub fn center(&self) -> Point {
        Point::new(
            self.origin.0 as f64 + self.image.width() as f64 / 2.0,
            self.origin.1 as f64 + self.image.height() as f64 / 2.0,
        )
    }
}

/// 屏幕 + 键鼠
#[async_trait]
pub trait Desktop: Send + Sync {
    async fn capture(&self) -> Result<Screen>;
    async fn click_at(&self, point: Point, button: MouseButton) -> Result<()>;
    async fn press(&self, key: Key) -> Result<()>;
    /// 依次按下 `keys`，再逆序释放
    async fn hotkey(&self, keys: &[Key]) -> Result<()>;
    async fn screen_center(&self) -> Result<Point> {
        Ok(self.capture().await?.center())
    }
}

/// 基于 xcap + rdev 的系统桌面
pub struct SystemDesktop {
    /// 相邻两个输入事件之间的间隔，部分系统过快会丢事件
    event_gap: Duration,
}

impl Default for SystemDesktop {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl SystemDesktop {
    pub fn new(event_gap: Duration) -> Self {
        Self { event_gap }
    }

    /// `rdev::simulate` 是同步系统调用，放到阻塞线程池执行
    async fn send(&self, event: EventType) -> Result<()> {
        let label = format!("{:?}", event);
        tokio::task::spawn_blocking(move || rdev::simulate(&event))
            .await
            .map_err(|e| AutomationError::Input(format!("{}: 输入任务失败: {}", label, e)))?
            .map_err(|e| AutomationError::Input(format!("{}: {:?}", label, e)))?;
        sleep(self.event_gap).await;
        Ok(())
    }
}

fn capture_primary() -> Result<Screen> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| AutomationError::Capture(format!("获取显示器失败: {e}")))?;

    let mut primary = None;
    for monitor in monitors {
        if monitor
            .is_primary()
            .map_err(|e| AutomationError::Capture(format!("读取主显示器状态失败: {e}")))?
        {
            primary = Some(monitor);
            break;
        }
    }
    let monitor = primary.ok_or_else(|| AutomationError::Capture("未找到主显示器".to_string()))?;

    let origin = (
        monitor
            .x()
            .map_err(|e| AutomationError::Capture(e.to_string()))?,
        monitor
            .y()
            .map_err(|e| AutomationError::Capture(e.to_string()))?,
    );
    let image = monitor
        .capture_image()
        .map_err(|e| AutomationError::Capture(format!("截图失败: {e}")))?;

    Ok(Screen { image, origin })
}

#[async_trait]
impl Desktop for SystemDesktop {
    async fn capture(&self) -> Result<Screen> {
        tokio::task::spawn_blocking(capture_primary)
            .await
            .map_err(|e| AutomationError::Capture(format!("截图任务失败: {e}")))?
    }

    async fn click_at(&self, point: Point, button: MouseButton) -> Result<()> {
        debug!("点击 ({:.0}, {:.0}) {:?}", point.x, point.y, button);
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        self.send(EventType::MouseMove {
            x: point.x,
            y: point.y,
        })
        .await?;
        self.send(EventType::ButtonPress(button)).await?;
        self.send(EventType::ButtonRelease(button)).await
    }

    async fn press(&self, key: Key) -> Result<()> {
        self.send(EventType::KeyPress(key)).await?;
        self.send(EventType::KeyRelease(key)).await
    }

    async fn hotkey(&self, keys: &[Key]) -> Result<()> {
        for key in keys {
            self.send(EventType::KeyPress(*key)).await?;
        }
        for key in keys.iter().rev() {
            self.send(EventType::KeyRelease(*key)).await?;
        }
        Ok(())
    }
}
