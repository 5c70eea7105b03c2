//! 错误类型
//!
//! 单条候选人处理中的所有失败都归入 `AutomationError`，
//! 在 RecordPipeline 边界统一捕获并转换为 `FailureKind`。

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 自动化错误
#[derive(Debug, Error)]
pub enum AutomationError {
    /// 在超时时间内未能定位到目标元素
    #[error("未找到目标 {target} (等待 {timeout:?})")]
    NotFound { target: String, timeout: Duration },

    /// 下载目录中未出现符合条件的新文件
    #[error("等待下载超时: {} (等待 {timeout:?})", directory.display())]
    DownloadTimeout {
        directory: PathBuf,
        timeout: Duration,
    },

    /// 拠点名在联系人目录中不存在
    #[error("未找到拠点对应的联系人: {branch}")]
    MissingContact { branch: String },

    /// 通知发送失败
    #[error("通知发送失败 (收件人: {recipient}): {message}")]
    DispatchFailure { recipient: String, message: String },

    /// 操作员触发的强制终止
    #[error("操作员强制终止")]
    FatalAbort,

    /// 目标不支持该动作（例如对图像目标读取属性）
    #[error("目标 {target} 不支持动作 {action}")]
    Unsupported { target: String, action: String },

    /// 浏览器 / CDP 错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    /// JS 执行返回了异常
    #[error("脚本执行失败: {0}")]
    Script(String),

    /// 键鼠模拟失败
    #[error("键鼠操作失败: {0}")]
    Input(String),

    /// 屏幕截图失败
    #[error("屏幕截图失败: {0}")]
    Capture(String),

    /// 图片读取 / 保存失败
    #[error("图片处理失败: {0}")]
    Image(#[from] image::ImageError),

    /// 直接下载请求失败
    #[error("下载请求失败 ({url}): {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// 文件操作失败
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// 表格读取失败
    #[error("表格读取失败 ({path}): {message}")]
    Table { path: String, message: String },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

/// 失败分类（用于结果统计）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    NotFound,
    DownloadTimeout,
    MissingContact,
    DispatchFailure,
    FatalAbort,
    Other,
}

impl AutomationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AutomationError::NotFound { .. } => FailureKind::NotFound,
            AutomationError::DownloadTimeout { .. } => FailureKind::DownloadTimeout,
            AutomationError::MissingContact { .. } => FailureKind::MissingContact,
            AutomationError::DispatchFailure { .. } => FailureKind::DispatchFailure,
            AutomationError::FatalAbort => FailureKind::FatalAbort,
            _ => FailureKind::Other,
        }
    }

    /// 是否为可重试的瞬时错误
    ///
    /// 只有定位超时属于 UI 时序问题，其余错误重试也不会改变结果。
    pub fn is_transient(&self) -> bool {
        matches!(self, AutomationError::NotFound { .. })
    }

    // ========== 便捷构造函数 ==========

    pub fn not_found(target: impl Into<String>, timeout: Duration) -> Self {
        AutomationError::NotFound {
            target: target.into(),
            timeout,
        }
    }

    pub fn dispatch_failed(recipient: impl Into<String>, message: impl ToString) -> Self {
        AutomationError::DispatchFailure {
            recipient: recipient.into(),
            message: message.to_string(),
        }
    }

    pub fn table(path: impl Into<String>, message: impl ToString) -> Self {
        AutomationError::Table {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// 自动化结果类型
pub type Result<T> = std::result::Result<T, AutomationError>;
