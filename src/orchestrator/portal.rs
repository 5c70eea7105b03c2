//! 后台会话准备 - 编排层
//!
//! 登录 → 打开应募者一览 → 按状态筛选 → （需要时）导出 CSV。

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::control::{RetryPolicy, Schedule};
use crate::error::{AutomationError, Result};
use crate::services::{
    Action, ActionOutput, CompletedDownload, DownloadWatcher, Locator, NamedTarget, TargetSet,
};

/// 会话准备所需参数
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub username: String,
    pub password: String,
    pub filter_status: String,
    pub download_dir: PathBuf,
    pub element_timeout: Duration,
    pub download_timeout: Duration,
    pub schedule: Schedule,
    pub retry: RetryPolicy,
}

struct Portal<'a> {
    locator: &'a Locator,
    targets: &'a TargetSet,
    settings: &'a PortalSettings,
}

impl Portal<'_> {
    async fn act(&self, name: NamedTarget, action: Action) -> Result<ActionOutput> {
        let target = self.targets.require(name)?;
        let locator = self.locator;
        let timeout = self.settings.element_timeout;
        self.settings
            .retry
            .run_if(
                move || locator.await_and_act(target, timeout, action.clone()),
                AutomationError::is_transient,
            )
            .await
    }

    async fn login(&self) -> Result<()> {
        info!("🔐 登录后台...");
        self.act(NamedTarget::LoginEntry, Action::Click).await?;
        self.settings.schedule.settle().await;
        self.act(
            NamedTarget::AccountInput,
            Action::Fill(self.settings.username.clone()),
        )
        .await?;
        self.act(
            NamedTarget::PasswordInput,
            Action::Fill(self.settings.password.clone()),
        )
        .await?;
        self.act(NamedTarget::LoginSubmit, Action::Click).await?;
        self.settings.schedule.settle().await;
        info!("✓ 登录完成");
        Ok(())
    }

    async fn open_entries(&self) -> Result<()> {
        info!("📋 打开应募者一览");
        self.act(NamedTarget::EntriesNav, Action::Click).await?;
        self.settings.schedule.settle().await;
        Ok(())
    }

    async fn filter(&self) -> Result<()> {
        let status = self.settings.filter_status.clone();
        info!("🔎 按状态 {} 筛选", status);
        self.act(NamedTarget::StatusFilter, Action::Select(status))
            .await?;
        self.act(NamedTarget::SearchButton, Action::Click).await?;
        self.settings.schedule.settle().await;
        Ok(())
    }

    async fn export_table(&self) -> Result<PathBuf> {
        info!("📤 导出候选人 CSV...");
        let watcher = DownloadWatcher::new(self.settings.schedule.download_poll);
        let trigger = async {
            self.act(NamedTarget::ExportButton, Action::Click).await?;
            Ok::<(), AutomationError>(())
        };
        watcher
            .wait_for_new_file(
                &self.settings.download_dir,
                &CompletedDownload::csv(),
                self.settings.download_timeout,
                trigger,
            )
            .await
    }
}

/// 准备会话；`export` 为真时导出表格并返回其路径
pub async fn prepare_session(
    locator: &Locator,
    targets: &TargetSet,
    settings: &PortalSettings,
    export: bool,
) -> Result<Option<PathBuf>> {
    let portal = Portal {
        locator,
        targets,
        settings,
    };
    portal.login().await?;
    portal.open_entries().await?;
    portal.filter().await?;

    if export {
        Ok(Some(portal.export_table().await?))
    } else {
        Ok(None)
    }
}
