//! 联系人目录
//!
//! 拠点名 → 收件人。数据来自联系人工作簿 (xlsx)，
//! 同一工作簿的另一张表保存邮件件名 (B1) 与正文 (B2)。

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use tracing::{info, warn};

use crate::error::{AutomationError, Result};
use crate::models::{normalize_branch, Contact};
use crate::services::notifier::MailTemplate;

const BRANCH_HEADER: &str = "拠点名";
const PERSON_HEADER: &str = "担当者";
const TO_HEADER: &str = "To:";
const CC_HEADER: &str = "Cc:";

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn lookup(&self, branch_label: &str) -> Option<Contact>;
}

/// 内存中的联系人表，键为规范化后的拠点名
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    contacts: HashMap<String, Contact>,
}

impl ContactBook {
    /// 同一拠点出现多次时保留第一条
    pub fn insert(&mut self, branch_label: &str, contact: Contact) {
        let key = normalize_branch(branch_label);
        if key.is_empty() {
            return;
        }
        self.contacts.entry(key).or_insert(contact);
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, branch_label: &str) -> Option<&Contact> {
        self.contacts.get(&normalize_branch(branch_label))
    }

    /// 从表格行构建，第一行为表头
    pub fn from_rows(rows: &[Vec<String>]) -> Result<Self> {
        let Some((header, body)) = rows.split_first() else {
            return Ok(Self::default());
        };
        let column = |name: &str| {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| AutomationError::table("contacts", format!("缺少列: {}", name)))
        };
        let branch = column(BRANCH_HEADER)?;
        let person = column(PERSON_HEADER)?;
        let to = column(TO_HEADER)?;
        let cc = column(CC_HEADER)?;

        let mut book = Self::default();
        for row in body {
            let label = cell(row, branch);
            if label.is_empty() {
                continue;
            }
            book.insert(
                &label,
                Contact {
                    address: cell(row, to),
                    cc: cell(row, cc),
                    display_name: cell(row, person),
                },
            );
        }
        Ok(book)
    }

    /// 读取联系人工作簿
    ///
    /// - 联系人表：`contact_sheet`，未指定时取第一张
    /// - 邮件模板表：`body_sheet`，未指定时取第二张（只有一张时取第一张）
    pub fn load_workbook(
        path: &Path,
        contact_sheet: Option<&str>,
        body_sheet: Option<&str>,
    ) -> Result<(Self, MailTemplate)> {
        let source = path.display().to_string();
        let mut workbook: Xlsx<_> =
            open_workbook(path).map_err(|e| AutomationError::table(&source, e))?;
        let names = workbook.sheet_names().to_vec();
        if names.is_empty() {
            return Err(AutomationError::table(&source, "工作簿中没有工作表"));
        }

        let pick = |wanted: Option<&str>, fallback: usize| -> Result<String> {
            match wanted {
                Some(name) if names.iter().any(|n| n == name) => Ok(name.to_string()),
                Some(name) => Err(AutomationError::table(&source, format!("找不到工作表: {}", name))),
                None => Ok(names[fallback.min(names.len() - 1)].clone()),
            }
        };
        let contact_name = pick(contact_sheet, 0)?;
        let body_name = pick(body_sheet, 1)?;

        let range = workbook
            .worksheet_range(&contact_name)
            .map_err(|e| AutomationError::table(&source, e))?;
        let book = Self::from_rows(&range_rows(&range))?;

        let template_range = workbook
            .worksheet_range(&body_name)
            .map_err(|e| AutomationError::table(&source, e))?;
        let text_at = |pos: (u32, u32)| {
            template_range
                .get_value(pos)
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        let template = MailTemplate::new(&text_at((0, 1)), &text_at((1, 1)));
        if template.subject.is_empty() {
            warn!("⚠️ 邮件件名为空 (工作表 {} 的 B1)", body_name);
        }

        info!("📇 已加载联系人 {} 条 (工作表 {})", book.len(), contact_name);
        Ok((book, template))
    }
}

fn cell(row: &[String], idx: usize) -> String {
    row.get(idx).map(|v| v.trim().to_string()).unwrap_or_default()
}

fn range_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

#[async_trait]
impl ContactDirectory for ContactBook {
    async fn lookup(&self, branch_label: &str) -> Option<Contact> {
        self.get(branch_label).cloned()
    }
}
