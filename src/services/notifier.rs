//! 通知通道
//!
//! 把（收件人, CC, 件名, 正文, 附件路径）交给外部邮件网关。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{AutomationError, Result};
use crate::models::{Attachment, Contact};

/// 邮件模板（件名 + 正文）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailTemplate {
    pub subject: String,
    pub body: String,
}

impl MailTemplate {
    /// 工作簿里的正文用 `%0a` 表示换行
    pub fn new(subject: &str, body: &str) -> Self {
        Self {
            subject: subject.trim().to_string(),
            body: body.replace("%0a", "\n").trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: String,
    pub cc: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

/// 生成候选人通知：正文前加上 "{担当者} さん"
pub fn compose_notification(
    contact: &Contact,
    template: &MailTemplate,
    attachment: &Attachment,
) -> Notification {
    let person = contact.display_name.trim();
    let body = match (person.is_empty(), template.body.is_empty()) {
        (false, false) => format!("{} さん\n\n{}", person, template.body),
        (false, true) => format!("{} さん\n\n", person),
        (true, _) => template.body.clone(),
    };

    Notification {
        to: contact.address.trim().to_string(),
        cc: contact.cc.trim().to_string(),
        subject: template.subject.clone(),
        body,
        attachments: vec![attachment.path.clone()],
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// 以 JSON POST 到邮件网关
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutomationError::Config(format!("创建 HTTP 客户端失败: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            "✉️ 发送通知 To={} Cc={} 件名={}",
            notification.to, notification.cc, notification.subject
        );
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| AutomationError::dispatch_failed(&notification.to, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AutomationError::dispatch_failed(
                &notification.to,
                format!("HTTP {}: {}", status, text),
            ));
        }
        debug!("通知网关返回 {}", status);
        Ok(())
    }
}
