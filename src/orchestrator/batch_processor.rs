//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：日志、目标解析、连接 / 启动浏览器、热键监控
//! 2. **会话准备**：登录、筛选、导出候选人表格
//! 3. **批量处理**：加载记录与联系人，交给 RunController 逐条处理
//! 4. **资源管理**：唯一持有 BrowserSession 的模块，正常结束与热键终止都会释放
//! 5. **全局统计**：输出最终统计

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::browser::{self, BrowserSession};
use crate::config::Config;
use crate::control::{
    exit_after, GlobalKeyboard, Hotkey, RetryPolicy, RunState, Schedule, SignalConfig,
    SignalMonitor,
};
use crate::infrastructure::{HttpFetcher, JsExecutor, SystemDesktop};
use crate::models::{latest_table, load_records, Record};
use crate::orchestrator::portal::{prepare_session, PortalSettings};
use crate::orchestrator::run_controller::{RunController, RunSummary};
use crate::services::{ContactBook, Locator, MailTemplate, TargetSet, WebhookNotifier};
use crate::utils::logging::{
    init_logging, log_startup, log_table_preview, print_final_stats,
};
use crate::workflow::{PipelineDeps, PipelineSettings, RecordPipeline};

/// 关闭浏览器的最长等待
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// 应用主结构
pub struct App {
    config: Config,
    session: BrowserSession,
    locator: Arc<Locator>,
    targets: Arc<TargetSet>,
    state: Arc<RunState>,
    monitor: Option<SignalMonitor>,
    log_path: PathBuf,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let log_path = init_logging(&config)?;
        log_startup(&config);

        let targets = Arc::new(TargetSet::resolve(&config).context("解析目标元素失败")?);

        // 连接或启动浏览器
        let (browser, page) = match &config.browser_executable {
            Some(executable) => browser::launch_browser(executable, &config.target_url).await?,
            None => {
                browser::connect_to_browser_and_page(config.browser_debug_port, &config.target_url)
                    .await?
            }
        };
        let session = BrowserSession::new(browser, config.browser_executable.is_some());
        browser::route_downloads(&page, &config.download_dir()).await?;

        let schedule = Schedule::from_config(&config.intervals);
        let locator = Arc::new(Locator::new(
            Arc::new(JsExecutor::new(page)),
            Arc::new(SystemDesktop::default()),
            schedule.locator_poll,
        ));

        // 热键监控
        let state = Arc::new(RunState::new());
        let signal_config = SignalConfig {
            abort: Hotkey::parse(&config.abort_hotkey).context("终止热键无效")?,
            pause: Hotkey::parse(&config.pause_hotkey).context("暂停热键无效")?,
            sample_interval: schedule.hotkey_sample,
            debounce: schedule.hotkey_debounce,
        };
        let abort_state = state.clone();
        let abort_session = session.clone();
        let monitor = SignalMonitor::spawn(
            state.clone(),
            GlobalKeyboard::start(),
            signal_config,
            exit_after(move || {
                let state = abort_state.clone();
                let session = abort_session.clone();
                async move {
                    state.stop();
                    error!("🛑 操作员强制终止，释放浏览器后退出");
                    session.release(RELEASE_TIMEOUT).await;
                }
            }),
        );

        Ok(Self {
            config,
            session,
            locator,
            targets,
            state,
            monitor: Some(monitor),
            log_path,
        })
    }

    /// 运行应用主逻辑，结束时（无论成败）释放浏览器
    pub async fn run(mut self) -> Result<RunSummary> {
        let result = self.run_batch().await;
        if let Some(monitor) = self.monitor.take() {
            monitor.shutdown();
        }
        self.session.release(RELEASE_TIMEOUT).await;
        result
    }

    async fn run_batch(&self) -> Result<RunSummary> {
        let table = self.prepare().await?;
        let records = load_records(&table, &self.config.columns)
            .await
            .with_context(|| format!("读取候选人表格失败: {}", table.display()))?;
        log_table_preview(&records, &table);

        let summary = if records.is_empty() {
            warn!("⚠️ 没有待处理的候选人，程序结束");
            RunSummary::default()
        } else {
            self.process_all(&records).await?
        };

        print_final_stats(&summary, Some(self.log_path.as_path()));
        Ok(summary)
    }

    /// 登录并确定候选人表格路径
    async fn prepare(&self) -> Result<PathBuf> {
        let settings = PortalSettings {
            username: self.config.login_username.clone(),
            password: self.config.login_password.clone(),
            filter_status: self.config.filter_status.clone(),
            download_dir: self.config.download_dir(),
            element_timeout: self.config.timeouts.element(),
            download_timeout: self.config.timeouts.download(),
            schedule: Schedule::from_config(&self.config.intervals),
            retry: RetryPolicy::from_config(&self.config.retry),
        };

        let export = self.config.source_table.is_none();
        let exported = prepare_session(&self.locator, &self.targets, &settings, export)
            .await
            .context("后台会话准备失败")?;

        match (exported, &self.config.source_table) {
            (Some(path), _) => Ok(path),
            (None, Some(source)) => resolve_table(Path::new(source)).await,
            (None, None) => anyhow::bail!("未能获得候选人表格"),
        }
    }

    async fn process_all(&self, records: &[Record]) -> Result<RunSummary> {
        let contacts_path = PathBuf::from(&self.config.contacts_file);
        let (book, template) = ContactBook::load_workbook(
            &contacts_path,
            self.config.contact_sheet.as_deref(),
            self.config.body_sheet.as_deref(),
        )
        .with_context(|| format!("读取联系人工作簿失败: {}", contacts_path.display()))?;
        let template = self.fill_template(template);

        let fetch_timeout = self.config.timeouts.fetch();
        let notifier = Arc::new(WebhookNotifier::new(
            &self.config.notify_webhook_url,
            fetch_timeout,
        )?);

        let deps = PipelineDeps {
            locator: self.locator.clone(),
            targets: self.targets.clone(),
            fetcher: Arc::new(HttpFetcher::new(fetch_timeout)?),
            contacts: Arc::new(book),
            notifier: notifier.clone(),
            state: self.state.clone(),
        };
        let summary_subject = format!("{} 処理結果", template.subject);
        let settings = PipelineSettings::from_config(&self.config, template);
        let pipeline = RecordPipeline::new(deps, settings);

        let controller = RunController::new(
            pipeline,
            self.state.clone(),
            Schedule::from_config(&self.config.intervals).pause_poll,
            notifier,
        )
        .with_summary(self.config.summary_recipient.clone(), summary_subject);

        info!("▶️ 开始处理 {} 条记录", records.len());
        Ok(controller.run(records).await)
    }

    /// 工作簿中没有件名 / 正文时使用配置值
    fn fill_template(&self, template: MailTemplate) -> MailTemplate {
        let subject = if template.subject.is_empty() {
            self.config.mail_subject.as_str()
        } else {
            template.subject.as_str()
        };
        let body = if template.body.is_empty() {
            self.config.mail_body.as_str()
        } else {
            template.body.as_str()
        };
        MailTemplate::new(subject, body)
    }
}

/// `source` 为目录时取其中最新的 CSV
async fn resolve_table(source: &Path) -> Result<PathBuf> {
    if source.is_dir() {
        latest_table(source, "csv")
            .await?
            .with_context(|| format!("目录中没有 CSV: {}", source.display()))
    } else {
        Ok(source.to_path_buf())
    }
}
