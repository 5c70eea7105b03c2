//! 候选人处理上下文
//!
//! 封装"我正在处理第几位候选人"这一信息，用作日志前缀

use std::fmt::Display;

use crate::models::Record;

#[derive(Debug, Clone)]
pub struct RecordCtx {
    /// 在表格中的序号（从1开始）
    pub index: usize,
    pub total: usize,
    /// 応募者ID
    pub identifier: String,
}

impl RecordCtx {
    pub fn new(index: usize, total: usize, record: &Record) -> Self {
        Self {
            index,
            total,
            identifier: record.identifier.clone(),
        }
    }
}

impl Display for RecordCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[候选人 {}/{} #{}]",
            self.index, self.total, self.identifier
        )
    }
}
