use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs;

use crate::config::ColumnConfig;
use crate::error::{AutomationError, Result};
use crate::models::record::{normalize_branch, Record};

/// 从导出的 CSV 读取候选人记录（按固定列位置）
pub async fn load_records(path: &Path, columns: &ColumnConfig) -> Result<Vec<Record>> {
    let content = fs::read(path).await?;
    parse_records(content.as_slice(), columns, &path.display().to_string())
}

/// 解析 CSV 内容
///
/// 首行为表头；年龄无法解析或缺列的行会被跳过并记录警告。
pub fn parse_records<R: Read>(
    reader: R,
    columns: &ColumnConfig,
    source_name: &str,
) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        // 表头占第 1 行
        let line = index + 2;
        let row = row.map_err(|e| AutomationError::table(source_name, e))?;
        let cell = |position: usize| {
            row.get(position)
                .map(|v| v.trim().trim_start_matches('\u{feff}'))
        };

        let (Some(identifier), Some(full_name), Some(age_text)) = (
            cell(columns.identifier),
            cell(columns.full_name),
            cell(columns.age),
        ) else {
            tracing::warn!("第 {} 行列数不足 ({} 列)，已跳过", line, row.len());
            continue;
        };

        let Some(age) = parse_age(age_text) else {
            tracing::warn!("第 {} 行年龄无法解析: {:?}，已跳过", line, age_text);
            continue;
        };

        records.push(Record {
            identifier: identifier.to_string(),
            full_name: full_name.to_string(),
            contact_address: cell(columns.contact_address).unwrap_or_default().to_string(),
            branch_label: normalize_branch(cell(columns.branch_label).unwrap_or_default()),
            role_label: cell(columns.role_label).unwrap_or_default().to_string(),
            age,
        });
    }

    Ok(records)
}

/// 接受 `"30"`、`"30歳"`、`"30.0"` 等形式
fn parse_age(text: &str) -> Option<u32> {
    static AGE_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = AGE_PATTERN
        .get_or_init(|| Regex::new(r"^\s*(\d{1,3})(?:\.0+)?\s*(?:歳|才)?\s*$").ok())
        .as_ref()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// 目录中最新（按修改时间）的指定扩展名文件
pub async fn latest_table(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if latest.as_ref().map_or(true, |(t, _)| modified > *t) {
            latest = Some((modified, path));
        }
    }
    Ok(latest.map(|(_, path)| path))
}
