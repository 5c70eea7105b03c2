//! 日志工具模块
//!
//! tracing 订阅器初始化，以及启动横幅、表格预览、最终统计等格式化输出。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::Record;
use crate::orchestrator::RunSummary;

/// 初始化日志：控制台 (stderr) + `log_folder/automation_YYYYmmdd_HHMMSS.log`
///
/// `RUST_LOG` 优先；否则 `verbose_logging` 为真时用 debug，默认 info。
/// 返回日志文件路径。
pub fn init_logging(config: &Config) -> Result<PathBuf> {
    let log_dir = PathBuf::from(&config.log_folder);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("创建日志目录失败: {}", log_dir.display()))?;

    let file_name = format!(
        "automation_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let log_path = log_dir.join(&file_name);
    let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);

    let default_level = if config.verbose_logging { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init();

    Ok(log_path)
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 应募者简历转发");
    info!("🌐 目标站点: {}", config.target_url);
    info!("📂 下载目录: {}", config.download_folder);
    info!(
        "⌨️ 终止: [{}]  暂停/继续: [{}]",
        config.abort_hotkey, config.pause_hotkey
    );
    info!("{}", "=".repeat(60));
}

/// 运行前预览前 5 条记录
pub fn log_table_preview(records: &[Record], source: &Path) {
    info!("📄 数据来源: {}", source.display());
    info!("✓ 读取到 {} 条候选人记录，预览前 5 条:", records.len());
    for record in records.iter().take(5) {
        info!(
            "  {} | {} | {}岁 | {} | {}",
            record.identifier,
            truncate_text(&record.full_name, 20),
            record.age,
            truncate_text(&record.branch_label, 20),
            truncate_text(&record.role_label, 20)
        );
    }
    if records.is_empty() {
        warn!("⚠️ 表格中没有可处理的记录");
    }
}

/// 记录单条候选人开始处理
pub fn log_record_start(index: usize, total: usize, record: &Record) {
    info!("\n{}", "─".repeat(60));
    info!(
        "👤 [{}/{}] {} (拠点: {}, 年龄: {})",
        index, total, record.full_name, record.branch_label, record.age
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &RunSummary, log_path: Option<&Path>) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}/{}", summary.done(), summary.total());
    info!("⏭️ 跳过: {}", summary.skipped());
    info!("❌ 失败: {}", summary.failed());
    for (kind, count) in summary.failures_by_kind() {
        info!("   - {:?}: {}", kind, count);
    }
    if summary.aborted {
        warn!("🛑 运行被操作员中断");
    }
    info!("{}", "=".repeat(60));
    if let Some(path) = log_path {
        info!("\n日志已保存至: {}", path.display());
    }
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
