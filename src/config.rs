use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AutomationError, Result};

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 浏览器 ---
    /// 浏览器调试端口（未配置 browser_executable 时连接此端口）
    pub browser_debug_port: u16,
    /// 浏览器可执行文件；配置后由程序自行启动浏览器
    pub browser_executable: Option<String>,
    /// 招聘后台首页
    pub target_url: String,
    pub login_username: String,
    pub login_password: String,

    // --- 目录 ---
    /// 下载目录（PDF / CSV / 截图）
    pub download_folder: String,
    /// 图像模板目录
    pub template_folder: String,
    /// 日志目录
    pub log_folder: String,

    // --- 数据源 ---
    /// 候选人表格；为空时从后台导出
    pub source_table: Option<String>,
    pub columns: ColumnConfig,
    /// 联系人工作簿 (xlsx)
    pub contacts_file: String,
    pub contact_sheet: Option<String>,
    /// 邮件模板所在工作表（件名 B1 / 正文 B2）
    pub body_sheet: Option<String>,

    // --- 通知 ---
    pub notify_webhook_url: String,
    /// 工作簿中件名 / 正文为空时使用
    pub mail_subject: String,
    pub mail_body: String,
    /// 运行完成后的汇总通知收件人
    pub summary_recipient: Option<String>,

    // --- 后台状态值 ---
    pub filter_status: String,
    pub done_status: String,

    // --- 等待 / 重试 ---
    pub timeouts: TimeoutConfig,
    pub intervals: IntervalConfig,
    pub retry: RetryConfig,

    // --- 目标元素 ---
    /// 覆盖默认选择器：键为目标名，值为 `css:...` 或 `xpath:...`
    pub target_overrides: HashMap<String, String>,
    pub image_confidence: f32,
    pub image_grayscale: bool,

    // --- 热键 ---
    pub abort_hotkey: String,
    pub pause_hotkey: String,

    /// 是否显示详细日志
    pub verbose_logging: bool,
}

/// 表格列位置（从 0 开始）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub identifier: usize,
    pub full_name: usize,
    pub age: usize,
    pub contact_address: usize,
    pub branch_label: usize,
    pub role_label: usize,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            identifier: 0,
            full_name: 1,
            age: 4,
            contact_address: 8,
            branch_label: 29,
            role_label: 36,
        }
    }
}

/// 各步骤的超时（秒）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub element_secs: u64,
    pub close_secs: u64,
    pub download_secs: u64,
    pub fetch_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            element_secs: 16,
            close_secs: 3,
            download_secs: 60,
            fetch_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn element(&self) -> Duration {
        Duration::from_secs(self.element_secs)
    }

    pub fn close(&self) -> Duration {
        Duration::from_secs(self.close_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }
}

/// 轮询间隔（毫秒）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub locator_ms: u64,
    pub download_ms: u64,
    pub pause_ms: u64,
    pub hotkey_sample_ms: u64,
    pub hotkey_debounce_ms: u64,
    pub settle_ms: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            locator_ms: 1000,
            download_ms: 1000,
            pause_ms: 500,
            hotkey_sample_ms: 300,
            hotkey_debounce_ms: 500,
            settle_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub tries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tries: 3,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            browser_executable: None,
            target_url: "https://ats.rct.airwork.net/".to_string(),
            login_username: String::new(),
            login_password: String::new(),
            download_folder: "downloads".to_string(),
            template_folder: "templates".to_string(),
            log_folder: "logs".to_string(),
            source_table: None,
            columns: ColumnConfig::default(),
            contacts_file: "contacts.xlsx".to_string(),
            contact_sheet: None,
            body_sheet: None,
            notify_webhook_url: "http://localhost:8025/notify".to_string(),
            mail_subject: "応募者レジュメ送付".to_string(),
            mail_body: String::new(),
            summary_recipient: None,
            filter_status: "01".to_string(),
            done_status: "04".to_string(),
            timeouts: TimeoutConfig::default(),
            intervals: IntervalConfig::default(),
            retry: RetryConfig::default(),
            target_overrides: HashMap::new(),
            image_confidence: 0.8,
            image_grayscale: true,
            abort_hotkey: "Escape".to_string(),
            pause_hotkey: "Alt+Space".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 加载配置：TOML 文件（可选）+ 环境变量覆盖
    ///
    /// 文件路径取自 `AUTOMATION_CONFIG`，默认 `config.toml`，不存在时使用默认值。
    pub fn load() -> Result<Self> {
        let path = std::env::var("AUTOMATION_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let base = if Path::new(&path).exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| AutomationError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AutomationError::Config(e.to_string()))
    }

    fn with_env_overrides(self) -> Self {
        let base = self;
        Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", base.browser_debug_port),
            browser_executable: env_opt("BROWSER_EXECUTABLE", base.browser_executable),
            target_url: env_or("TARGET_URL", base.target_url),
            login_username: env_or("LOGIN_USERNAME", base.login_username),
            login_password: env_or("LOGIN_PASSWORD", base.login_password),
            download_folder: env_or("DOWNLOAD_FOLDER", base.download_folder),
            template_folder: env_or("TEMPLATE_FOLDER", base.template_folder),
            log_folder: env_or("LOG_FOLDER", base.log_folder),
            source_table: env_opt("SOURCE_TABLE", base.source_table),
            contacts_file: env_or("CONTACTS_FILE", base.contacts_file),
            notify_webhook_url: env_or("NOTIFY_WEBHOOK_URL", base.notify_webhook_url),
            summary_recipient: env_opt("SUMMARY_RECIPIENT", base.summary_recipient),
            verbose_logging: env_parse("VERBOSE_LOGGING", base.verbose_logging),
            ..base
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(&self.download_folder)
    }

    pub fn template_dir(&self) -> PathBuf {
        PathBuf::from(&self.template_folder)
    }
}

fn env_or(key: &str, fallback: String) -> String {
    std::env::var(key).unwrap_or(fallback)
}

fn env_opt(key: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(key).ok().or(fallback)
}

/// 无法解析时保留原值
fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
