//! 附件

use std::path::{Path, PathBuf};

/// 附件的获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionStrategy {
    /// 复用浏览器会话直接下载
    DirectFetch,
    /// 原生保存 / 打印对话框（像素操作）
    ScreenSave,
    /// 全屏截图（最后兜底）
    Screenshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Document,
    Image,
}

/// 绑定到一条候选人记录的附件
///
/// 发送通知后只释放引用，不删除文件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub strategy: AcquisitionStrategy,
}

impl Attachment {
    pub fn new(path: impl Into<PathBuf>, strategy: AcquisitionStrategy) -> Self {
        Self {
            path: path.into(),
            strategy,
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        match self.strategy {
            AcquisitionStrategy::Screenshot => AttachmentKind::Image,
            _ => AttachmentKind::Document,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
