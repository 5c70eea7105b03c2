//! 定位器
//!
//! 以固定间隔轮询目标，直到可观察后执行动作，超时返回 `NotFound`。
//! DOM 目标走浏览器，图像目标走屏幕截图 + 模板匹配，调用方不需要区分。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::control::poll_until;
use crate::error::{AutomationError, Result};
use crate::infrastructure::{find_template, Desktop, MatchOptions, MouseButton, Point, WebSession};
use crate::services::targets::{Capability, DomTarget, ImageTarget, Locate, Target};

/// 目标出现后执行的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// 只确认目标存在
    Observe,
    Click,
    Fill(String),
    ReadAttribute(String),
    Select(String),
}

impl Action {
    fn required_capability(&self) -> Capability {
        match self {
            Action::Observe => Capability::Locatable,
            Action::Click => Capability::Clickable,
            Action::Fill(_) | Action::ReadAttribute(_) | Action::Select(_) => Capability::Readable,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Observe => write!(f, "observe"),
            Action::Click => write!(f, "click"),
            Action::Fill(_) => write!(f, "fill"),
            Action::ReadAttribute(name) => write!(f, "read_attribute({})", name),
            Action::Select(value) => write!(f, "select({})", value),
        }
    }
}

/// 动作结果
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    Done,
    /// 图像目标的屏幕坐标
    Located(Point),
    /// 读取到的属性值
    Value(Option<String>),
}

impl ActionOutput {
    pub fn into_value(self) -> Option<String> {
        match self {
            ActionOutput::Value(value) => value,
            _ => None,
        }
    }
}

/// 定位器
pub struct Locator {
    web: Arc<dyn WebSession>,
    desktop: Arc<dyn Desktop>,
    poll: Duration,
}

impl Locator {
    pub fn new(web: Arc<dyn WebSession>, desktop: Arc<dyn Desktop>, poll: Duration) -> Self {
        Self { web, desktop, poll }
    }

    pub fn web(&self) -> &Arc<dyn WebSession> {
        &self.web
    }

    pub fn desktop(&self) -> &Arc<dyn Desktop> {
        &self.desktop
    }

    /// 等待目标出现并执行 `action`
    pub async fn await_and_act(
        &self,
        target: &Target,
        timeout: Duration,
        action: Action,
    ) -> Result<ActionOutput> {
        if !target.supports(action.required_capability()) {
            return Err(AutomationError::Unsupported {
                target: target.label().to_string(),
                action: action.to_string(),
            });
        }

        match &target.locate {
            Locate::Dom(dom) => {
                if !self.wait_dom(dom, timeout).await? {
                    return Err(AutomationError::not_found(target.label(), timeout));
                }
                debug!("目标 {} 已就绪，执行 {}", target.label(), action);
                self.act_dom(dom, action).await
            }
            Locate::Image(image) => {
                let point = self
                    .wait_image(image, timeout)
                    .await?
                    .ok_or_else(|| AutomationError::not_found(target.label(), timeout))?;
                debug!(
                    "图像目标 {} 位于 ({:.0}, {:.0})，执行 {}",
                    target.label(),
                    point.x,
                    point.y,
                    action
                );
                match action {
                    Action::Click => {
                        self.desktop.click_at(point, MouseButton::Left).await?;
                        Ok(ActionOutput::Done)
                    }
                    _ => Ok(ActionOutput::Located(point)),
                }
            }
        }
    }

    /// 目标是否在 `timeout` 内出现；超时返回 false 而不是错误
    pub async fn is_present(&self, target: &Target, timeout: Duration) -> Result<bool> {
        match &target.locate {
            Locate::Dom(dom) => self.wait_dom(dom, timeout).await,
            Locate::Image(image) => Ok(self.wait_image(image, timeout).await?.is_some()),
        }
    }

    async fn wait_dom(&self, dom: &DomTarget, timeout: Duration) -> Result<bool> {
        let web = &self.web;
        // 页面跳转期间 evaluate 可能失败，视为"尚未出现"继续轮询到超时
        let found = poll_until(self.poll, timeout, || async move {
            match web.probe(&dom.selector, dom.condition).await {
                Ok(ready) => Ok::<_, AutomationError>(ready.then_some(())),
                Err(e) => {
                    debug!("探测 {} 失败，继续等待: {}", dom.selector, e);
                    Ok(None)
                }
            }
        })
        .await?;
        Ok(found.is_some())
    }

    async fn wait_image(&self, image: &ImageTarget, timeout: Duration) -> Result<Option<Point>> {
        let desktop = &self.desktop;
        let options = MatchOptions {
            confidence: image.confidence,
            grayscale: image.grayscale,
        };
        poll_until(self.poll, timeout, || async move {
            let screen = desktop.capture().await?;
            let found = find_template(&screen.image, &image.template, options);
            Ok::<_, AutomationError>(found.map(|m| image.offset.point(&m, screen.origin)))
        })
        .await
    }

    async fn act_dom(&self, dom: &DomTarget, action: Action) -> Result<ActionOutput> {
        let selector = &dom.selector;
        match action {
            Action::Observe => Ok(ActionOutput::Done),
            Action::Click => {
                self.web.click(selector).await?;
                Ok(ActionOutput::Done)
            }
            Action::Fill(text) => {
                self.web.fill(selector, &text).await?;
                Ok(ActionOutput::Done)
            }
            Action::ReadAttribute(name) => {
                let value = self.web.read_attribute(selector, &name).await?;
                Ok(ActionOutput::Value(value))
            }
            Action::Select(value) => {
                self.web.select_value(selector, &value).await?;
                Ok(ActionOutput::Done)
            }
        }
    }
}
