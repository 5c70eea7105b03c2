//! 候选人记录

use serde::Serialize;

/// 年龄上限（不含）：`age >= AGE_LIMIT` 的候选人直接跳过
pub const AGE_LIMIT: u32 = 55;

/// 导出表格中的一行候选人
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub identifier: String,
    pub full_name: String,
    pub contact_address: String,
    /// 拠点名（已规范化）
    pub branch_label: String,
    /// 職種
    pub role_label: String,
    pub age: u32,
}

impl Record {
    /// 是否需要处理（54 岁为最大处理年龄）
    pub fn is_eligible(&self) -> bool {
        self.age < AGE_LIMIT
    }

    /// 附件文件名主干：`{氏名}_{拠点}_{職種}`，只保留安全字符
    pub fn file_stem(&self) -> String {
        let combined = [&self.full_name, &self.branch_label, &self.role_label]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");
        let stem = sanitize_stem(&combined);
        if stem.is_empty() {
            "resume".to_string()
        } else {
            stem
        }
    }
}

/// 只保留字母数字（含日文）、`_`、`-` 和空格
pub fn sanitize_stem(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

/// 拠点名规范化：按全角空格切分取最后一段
///
/// 例：`"株式会社サンプル　渋谷"` → `"渋谷"`
pub fn normalize_branch(text: &str) -> String {
    text.split('\u{3000}')
        .last()
        .unwrap_or_default()
        .trim()
        .to_string()
}
