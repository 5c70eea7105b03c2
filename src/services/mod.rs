//! 服务层
//!
//! 目标定位、下载检测、联系人目录与通知通道。

pub mod contacts;
pub mod download_watcher;
pub mod locator;
pub mod notifier;
pub mod targets;

pub use contacts::{ContactBook, ContactDirectory};
pub use download_watcher::{CompletedDownload, DownloadSnapshot, DownloadWatcher};
pub use locator::{Action, ActionOutput, Locator};
pub use notifier::{compose_notification, MailTemplate, Notification, Notifier, WebhookNotifier};
pub use targets::{
    Capability, ClickOffset, DomTarget, ImageTarget, Locate, NamedTarget, Target, TargetSet,
};
