//! 下载检测
//!
//! 浏览器 / 原生对话框的下载没有同步完成信号，只能对比目录快照：
//! 先记录已有文件，触发下载动作，再轮询新出现且已完成的文件。

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, info};

use crate::control::poll_until;
use crate::error::{AutomationError, Result};

/// 下载进行中的临时后缀
const PARTIAL_SUFFIXES: [&str; 4] = ["crdownload", "part", "tmp", "download"];

/// 某一时刻目录中的文件及修改时间
#[derive(Debug, Clone, Default)]
pub struct DownloadSnapshot {
    entries: HashMap<PathBuf, SystemTime>,
}

impl DownloadSnapshot {
    /// 读取目录；目录不存在时视为空
    pub async fn take(directory: &Path) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut dir = match fs::read_dir(directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // 文件在读取期间被重命名
                Err(_) => continue,
            };
            if metadata.is_file() {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                entries.insert(entry.path(), modified);
            }
        }
        Ok(Self { entries })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    /// `later` 中新出现的文件
    pub fn added_in<'a>(&self, later: &'a DownloadSnapshot) -> Vec<(&'a Path, SystemTime)> {
        later
            .entries
            .iter()
            .filter(|(path, _)| !self.contains(path))
            .map(|(path, modified)| (path.as_path(), *modified))
            .collect()
    }
}

/// 下载完成判定：扩展名符合且不带临时后缀
#[derive(Debug, Clone)]
pub struct CompletedDownload {
    extensions: Vec<String>,
}

impl CompletedDownload {
    pub fn with_extension(extension: &str) -> Self {
        Self {
            extensions: vec![extension.trim_start_matches('.').to_lowercase()],
        }
    }

    pub fn pdf() -> Self {
        Self::with_extension("pdf")
    }

    pub fn csv() -> Self {
        Self::with_extension("csv")
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        if PARTIAL_SUFFIXES.contains(&ext.as_str()) {
            return false;
        }
        self.extensions.iter().any(|allowed| *allowed == ext)
    }
}

/// 下载检测器
#[derive(Debug, Clone)]
pub struct DownloadWatcher {
    poll: Duration,
}

impl DownloadWatcher {
    pub fn new(poll: Duration) -> Self {
        Self { poll }
    }

    /// 记录快照 → 执行 `trigger` → 轮询新文件
    ///
    /// 同一轮出现多个符合条件的文件时，取修改时间最新的。
    pub async fn wait_for_new_file<Fut>(
        &self,
        directory: &Path,
        predicate: &CompletedDownload,
        timeout: Duration,
        trigger: Fut,
    ) -> Result<PathBuf>
    where
        Fut: Future<Output = Result<()>>,
    {
        let before = DownloadSnapshot::take(directory).await?;
        debug!("下载目录快照: {} 个文件", before.file_count());

        trigger.await?;

        let before = &before;
        let found = poll_until(self.poll, timeout, || async move {
            let now = DownloadSnapshot::take(directory).await?;
            let newest = before
                .added_in(&now)
                .into_iter()
                .filter(|(path, _)| predicate.accepts(path))
                .max_by_key(|(_, modified)| *modified)
                .map(|(path, _)| path.to_path_buf());
            Ok::<_, AutomationError>(newest)
        })
        .await?;

        match found {
            Some(path) => {
                info!("📥 检测到新文件: {}", path.display());
                Ok(path)
            }
            None => Err(AutomationError::DownloadTimeout {
                directory: directory.to_path_buf(),
                timeout,
            }),
        }
    }
}
