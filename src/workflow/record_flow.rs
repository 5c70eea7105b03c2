//! 候选人处理流程 - 流程层
//!
//! 核心职责：定义"一位候选人"的完整处理流程
//!
//! 流程顺序：
//! 1. 年龄检查（55 岁及以上直接跳过）
//! 2. 搜索 → 打开详情
//! 3. 获取简历：直接下载 → 屏幕保存 → 全屏截图（兜底）
//! 4. 查找联系人 → 发送通知
//! 5. 更新状态（失败只记录）
//! 6. 关闭详情（所有路径都会执行）
//!
//! 除 `FatalAbort` 外的错误都在 `run` 中统一捕获，转换为 `RecordOutcome::Failed`。

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rdev::Key;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::control::{poll_until, RetryPolicy, RunState, Schedule};
use crate::error::{AutomationError, FailureKind, Result};
use crate::infrastructure::{DocumentFetcher, MouseButton, SessionCredentials};
use crate::models::{AcquisitionStrategy, Attachment, Record};
use crate::services::{
    compose_notification, Action, ActionOutput, CompletedDownload, ContactDirectory,
    DownloadWatcher, Locate, Locator, MailTemplate, NamedTarget, Notifier, TargetSet,
};
use crate::utils::truncate_text;
use crate::workflow::record_ctx::RecordCtx;

/// 简历获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    Direct,
    ScreenFallback,
}

/// 流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Searching,
    DetailOpen,
    AcquiringDocument(AcquireMode),
    Notifying,
    StatusUpdating,
    Closing,
    Done,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "待机"),
            Stage::Searching => write!(f, "搜索"),
            Stage::DetailOpen => write!(f, "详情"),
            Stage::AcquiringDocument(AcquireMode::Direct) => write!(f, "获取简历(直接下载)"),
            Stage::AcquiringDocument(AcquireMode::ScreenFallback) => write!(f, "获取简历(屏幕保存)"),
            Stage::Notifying => write!(f, "通知"),
            Stage::StatusUpdating => write!(f, "更新状态"),
            Stage::Closing => write!(f, "关闭"),
            Stage::Done => write!(f, "完成"),
            Stage::Error => write!(f, "错误"),
        }
    }
}

/// 单条记录的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// 年龄超限，未做任何操作
    Skipped,
    Done(AcquisitionStrategy),
    Failed {
        /// 出错时所处的状态
        stage: Stage,
        kind: FailureKind,
        message: String,
    },
}

impl RecordOutcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RecordOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordReport {
    pub identifier: String,
    pub outcome: RecordOutcome,
    /// 依次进入的状态
    pub trace: Vec<Stage>,
    /// 通知前绑定的附件（跳过时为空）
    pub attachment: Option<Attachment>,
}

impl RecordReport {
    /// 某状态进入的次数
    pub fn entered(&self, stage: Stage) -> usize {
        self.trace.iter().filter(|s| **s == stage).count()
    }
}

/// 流程依赖的外部能力
#[derive(Clone)]
pub struct PipelineDeps {
    pub locator: Arc<Locator>,
    pub targets: Arc<TargetSet>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub state: Arc<RunState>,
}

/// 流程参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub download_dir: PathBuf,
    pub element_timeout: Duration,
    /// 关闭详情时等待关闭按钮的时间（未打开时只等这么久）
    pub close_timeout: Duration,
    pub download_timeout: Duration,
    pub done_status: String,
    pub template: MailTemplate,
    pub schedule: Schedule,
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &Config, template: MailTemplate) -> Self {
        Self {
            download_dir: config.download_dir(),
            element_timeout: config.timeouts.element(),
            close_timeout: config.timeouts.close(),
            download_timeout: config.timeouts.download(),
            done_status: config.done_status.clone(),
            template,
            schedule: Schedule::from_config(&config.intervals),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// 单条记录在流程中的进度
struct Progress {
    stage: Stage,
    trace: Vec<Stage>,
    attachment: Option<Attachment>,
}

impl Progress {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            trace: vec![Stage::Idle],
            attachment: None,
        }
    }

    fn mark(&mut self, stage: Stage) {
        self.stage = stage;
        self.trace.push(stage);
    }
}

/// 候选人处理流程
///
/// - 编排单条记录的状态迁移
/// - 决定何时直接下载、何时走屏幕兜底
/// - 不持有浏览器 / 屏幕资源，只依赖 services 暴露的能力
pub struct RecordPipeline {
    deps: PipelineDeps,
    settings: PipelineSettings,
    watcher: DownloadWatcher,
}

impl RecordPipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        let watcher = DownloadWatcher::new(settings.schedule.download_poll);
        Self {
            deps,
            settings,
            watcher,
        }
    }

    /// 处理一条记录
    ///
    /// 只有 `FatalAbort` 会以 `Err` 返回，其余失败都记录在报告里。
    pub async fn run(&self, record: &Record, ctx: &RecordCtx) -> Result<RecordReport> {
        let mut progress = Progress::new();

        if !record.is_eligible() {
            info!("{} ⏭️ 年龄 {} 岁，跳过", ctx, record.age);
            progress.mark(Stage::Done);
            return Ok(RecordReport {
                identifier: record.identifier.clone(),
                outcome: RecordOutcome::Skipped,
                trace: progress.trace,
                attachment: None,
            });
        }

        let result = self.advance(record, ctx, &mut progress).await;
        let failed_stage = progress.stage;

        // 无论成功与否都关闭详情
        progress.mark(Stage::Closing);
        self.close_detail(ctx).await;

        let outcome = match result {
            Ok(strategy) => {
                progress.mark(Stage::Done);
                info!("{} ✅ 处理完成 ({:?})", ctx, strategy);
                RecordOutcome::Done(strategy)
            }
            Err(AutomationError::FatalAbort) => {
                warn!("{} 🛑 收到终止信号，停止处理", ctx);
                return Err(AutomationError::FatalAbort);
            }
            Err(e) => {
                progress.mark(Stage::Error);
                error!("{} ❌ 在 [{}] 阶段失败: {}", ctx, failed_stage, e);
                RecordOutcome::Failed {
                    stage: failed_stage,
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        Ok(RecordReport {
            identifier: record.identifier.clone(),
            outcome,
            trace: progress.trace,
            attachment: progress.attachment,
        })
    }

    async fn advance(
        &self,
        record: &Record,
        ctx: &RecordCtx,
        progress: &mut Progress,
    ) -> Result<AcquisitionStrategy> {
        // ========== 搜索 → 详情 ==========
        self.enter(progress, Stage::Searching).await?;
        self.search_and_open(record, ctx).await?;

        self.enter(progress, Stage::DetailOpen).await?;
        self.settings.schedule.settle().await;
        let resume_url = self.resume_url(ctx).await;

        // ========== 获取简历 ==========
        self.enter(progress, Stage::AcquiringDocument(AcquireMode::Direct))
            .await?;
        let stem = record.file_stem();
        let attachment = match self.fetch_direct(resume_url.as_deref(), &stem).await {
            Ok(attachment) => attachment,
            Err(e) => {
                warn!("{} ⚠️ 直接下载失败: {}，改用屏幕保存", ctx, e);
                self.enter(progress, Stage::AcquiringDocument(AcquireMode::ScreenFallback))
                    .await?;
                self.screen_fallback(&stem, ctx).await?
            }
        };
        info!(
            "{} 📎 附件: {} ({:?})",
            ctx,
            attachment.path().display(),
            attachment.strategy
        );
        let strategy = attachment.strategy;
        progress.attachment = Some(attachment);

        // ========== 联系人 → 通知 ==========
        let contact = self
            .deps
            .contacts
            .lookup(&record.branch_label)
            .await
            .ok_or_else(|| AutomationError::MissingContact {
                branch: record.branch_label.clone(),
            })?;

        self.enter(progress, Stage::Notifying).await?;
        let attachment = progress
            .attachment
            .as_ref()
            .ok_or_else(|| AutomationError::Script("附件未绑定".to_string()))?;
        let notification = compose_notification(&contact, &self.settings.template, attachment);
        self.deps
            .notifier
            .send(&notification)
            .await
            .map_err(|e| match e {
                AutomationError::DispatchFailure { .. } => e,
                other => AutomationError::dispatch_failed(&notification.to, other),
            })?;
        info!("{} ✉️ 已通知 {}", ctx, notification.to);

        // ========== 更新状态 ==========
        self.enter(progress, Stage::StatusUpdating).await?;
        match self
            .act(
                NamedTarget::StatusSelect,
                Action::Select(self.settings.done_status.clone()),
            )
            .await
        {
            Ok(_) => info!("{} ✓ 状态已更新为 {}", ctx, self.settings.done_status),
            Err(e) => warn!("{} ⚠️ 状态更新失败: {}", ctx, e),
        }
        self.settings.schedule.settle().await;

        Ok(strategy)
    }

    /// 挂起点：等待暂停解除并确认仍在运行，然后记录状态迁移
    async fn enter(&self, progress: &mut Progress, stage: Stage) -> Result<()> {
        self.deps
            .state
            .checkpoint(self.settings.schedule.pause_poll)
            .await?;
        debug!("{} → {}", progress.stage, stage);
        progress.mark(stage);
        Ok(())
    }

    /// 带重试地执行一个动作（只重试定位超时）
    async fn act(&self, name: NamedTarget, action: Action) -> Result<ActionOutput> {
        let target = self.deps.targets.require(name)?;
        let locator = &self.deps.locator;
        let timeout = self.settings.element_timeout;
        self.settings
            .retry
            .run_if(
                move || locator.await_and_act(target, timeout, action.clone()),
                AutomationError::is_transient,
            )
            .await
    }

    async fn act_once(&self, name: NamedTarget, action: Action) -> Result<ActionOutput> {
        let target = self.deps.targets.require(name)?;
        self.deps
            .locator
            .await_and_act(target, self.settings.element_timeout, action)
            .await
    }

    async fn search_and_open(&self, record: &Record, ctx: &RecordCtx) -> Result<()> {
        info!("{} 🔍 搜索: {}", ctx, record.full_name);
        self.act(NamedTarget::SearchBox, Action::Fill(record.full_name.clone()))
            .await?;
        self.act(NamedTarget::SearchButton, Action::Click).await?;
        self.settings.schedule.settle().await;
        self.await_results(record, ctx).await;

        // 先点整行，失败再点第一个单元格
        if let Err(e) = self.act_once(NamedTarget::ResultRow, Action::Click).await {
            warn!("{} 点击结果行失败 ({})，改为点击单元格", ctx, e);
            self.act(NamedTarget::ResultCell, Action::Click).await?;
        }
        debug!("{} 已打开详情", ctx);
        Ok(())
    }

    /// 等待结果行显示本次搜索的姓名，避免点中刷新前列表的第一行
    ///
    /// 超时只记录警告，按当前第一行继续。
    async fn await_results(&self, record: &Record, ctx: &RecordCtx) {
        let Some(Locate::Dom(dom)) = self
            .deps
            .targets
            .get(NamedTarget::ResultRow)
            .map(|target| &target.locate)
        else {
            return;
        };
        let web = self.deps.locator.web();
        let wanted = &compact(&record.full_name);
        let refreshed = poll_until(
            self.settings.schedule.locator_poll,
            self.settings.element_timeout,
            || async move {
                let text = web
                    .read_attribute(&dom.selector, "textContent")
                    .await
                    .ok()
                    .flatten();
                Ok::<_, AutomationError>(
                    text.filter(|t| compact(t).contains(wanted.as_str())).map(|_| ()),
                )
            },
        )
        .await;

        if !matches!(refreshed, Ok(Some(()))) {
            warn!("{} 结果行未显示 {}，按当前第一行继续", ctx, record.full_name);
        }
    }

    /// 简历链接；找不到时返回 None，由屏幕兜底处理
    async fn resume_url(&self, ctx: &RecordCtx) -> Option<String> {
        match self
            .act(NamedTarget::ResumeLink, Action::ReadAttribute("href".into()))
            .await
        {
            Ok(output) => {
                let url = output.into_value().filter(|u| !u.trim().is_empty());
                if let Some(url) = &url {
                    debug!("{} 简历链接: {}", ctx, truncate_text(url, 80));
                }
                url
            }
            Err(e) => {
                warn!("{} ⚠️ 未取得简历链接: {}", ctx, e);
                None
            }
        }
    }

    /// 复用浏览器会话直接下载 PDF
    ///
    /// 先写入 `{stem}.pdf.part`，完成后改名，下载目录中不会出现不完整的 `.pdf`。
    async fn fetch_direct(&self, url: Option<&str>, stem: &str) -> Result<Attachment> {
        let url = url.ok_or_else(|| {
            AutomationError::not_found(NamedTarget::ResumeLink.key(), self.settings.element_timeout)
        })?;

        let web = self.deps.locator.web();
        let credentials = SessionCredentials {
            cookies: web.cookies().await?,
            user_agent: web.user_agent().await.ok(),
        };
        let bytes = self.deps.fetcher.fetch(url, &credentials).await?;

        let dir = &self.settings.download_dir;
        fs::create_dir_all(dir).await?;
        let partial = dir.join(format!("{}.pdf.part", stem));
        let target = dir.join(format!("{}.pdf", stem));
        fs::write(&partial, &bytes).await?;
        fs::rename(&partial, &target).await?;

        Ok(Attachment::new(target, AcquisitionStrategy::DirectFetch))
    }

    /// 屏幕保存失败时再截全屏
    async fn screen_fallback(&self, stem: &str, ctx: &RecordCtx) -> Result<Attachment> {
        match self.save_via_dialog(stem, ctx).await {
            Ok(attachment) => Ok(attachment),
            Err(AutomationError::FatalAbort) => Err(AutomationError::FatalAbort),
            Err(e) => {
                warn!("{} ⚠️ 屏幕保存失败: {}，改为截图", ctx, e);
                self.capture_screenshot(stem).await
            }
        }
    }

    /// 在简历查看页通过原生保存对话框保存 PDF
    ///
    /// 有保存按钮模板时点击按钮；否则右键菜单 → 下移 4 项 → Enter。
    /// 随后 Enter 确认保存对话框，最后 Ctrl+W 关闭查看页。
    async fn save_via_dialog(&self, stem: &str, ctx: &RecordCtx) -> Result<Attachment> {
        let desktop = self.deps.locator.desktop();
        let schedule = &self.settings.schedule;
        let mut viewer_opened = false;

        let trigger = async {
            self.act(NamedTarget::ResumeLink, Action::Click).await?;
            viewer_opened = true;
            schedule.settle().await;
            schedule.settle().await;

            match self.deps.targets.get(NamedTarget::PrintSaveButton) {
                Some(button) => {
                    self.deps
                        .locator
                        .await_and_act(button, self.settings.element_timeout, Action::Click)
                        .await?;
                }
                None => {
                    let center = desktop.screen_center().await?;
                    desktop.click_at(center, MouseButton::Right).await?;
                    for _ in 0..4 {
                        desktop.press(Key::DownArrow).await?;
                    }
                    desktop.press(Key::Return).await?;
                }
            }
            for _ in 0..3 {
                schedule.settle().await;
            }
            desktop.press(Key::Return).await?;
            Ok::<(), AutomationError>(())
        };

        let found = self
            .watcher
            .wait_for_new_file(
                &self.settings.download_dir,
                &CompletedDownload::pdf(),
                self.settings.download_timeout,
                trigger,
            )
            .await;

        if viewer_opened {
            schedule.settle().await;
            if let Err(e) = desktop.hotkey(&[Key::ControlLeft, Key::KeyW]).await {
                warn!("{} 关闭简历查看页失败: {}", ctx, e);
            }
        }

        let saved = found?;
        let path = self.rename_to_stem(&saved, stem).await;
        Ok(Attachment::new(path, AcquisitionStrategy::ScreenSave))
    }

    /// 改名为 `{stem}.pdf`；目标已存在或改名失败时保留原文件名
    async fn rename_to_stem(&self, saved: &Path, stem: &str) -> PathBuf {
        let target = self.settings.download_dir.join(format!("{}.pdf", stem));
        if saved == target || fs::try_exists(&target).await.unwrap_or(true) {
            return saved.to_path_buf();
        }
        match fs::rename(saved, &target).await {
            Ok(()) => target,
            Err(e) => {
                warn!("重命名 {} 失败: {}", saved.display(), e);
                saved.to_path_buf()
            }
        }
    }

    /// 最后兜底：全屏截图作为附件
    async fn capture_screenshot(&self, stem: &str) -> Result<Attachment> {
        let screen = self.deps.locator.desktop().capture().await?;
        let dir = self.settings.download_dir.clone();
        fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.png", stem));

        let save_path = path.clone();
        tokio::task::spawn_blocking(move || screen.image.save(&save_path))
            .await
            .map_err(|e| AutomationError::Capture(format!("保存截图任务失败: {e}")))??;

        Ok(Attachment::new(path, AcquisitionStrategy::Screenshot))
    }

    /// 关闭详情面板；没有打开时只等待 `close_timeout`，不报错
    async fn close_detail(&self, ctx: &RecordCtx) {
        self.deps
            .state
            .block_while_paused(self.settings.schedule.pause_poll)
            .await;

        let Some(target) = self.deps.targets.get(NamedTarget::OverlayClose) else {
            return;
        };
        let locator = &self.deps.locator;
        let timeout = self.settings.close_timeout;

        match locator.is_present(target, timeout).await {
            Ok(true) => match locator.await_and_act(target, timeout, Action::Click).await {
                Ok(_) => {
                    debug!("{} 已关闭详情", ctx);
                    self.settings.schedule.settle().await;
                }
                Err(e) => warn!("{} 关闭详情失败: {}", ctx, e),
            },
            Ok(false) => debug!("{} 没有打开的详情", ctx),
            Err(e) => warn!("{} 检查详情面板失败: {}", ctx, e),
        }
    }
}

/// 去掉所有空白（含全角空格）后比较姓名
fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
