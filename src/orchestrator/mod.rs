//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 管理应用生命周期（初始化、运行、清理）
//! - 持有浏览器资源
//! - 输出全局统计信息
//!
//! ### `portal` - 后台会话准备
//! - 登录、打开一览、按状态筛选、导出 CSV
//!
//! ### `run_controller` - 运行控制器
//! - 按表格顺序逐条处理候选人
//! - 每条记录前检查暂停 / 终止
//! - 汇总结果，正常结束时发送汇总通知
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App)
//!     ↓
//! run_controller (处理 Vec<Record>)
//!     ↓
//! workflow::RecordPipeline (处理单个 Record)
//!     ↓
//! services (能力层：locator / download_watcher / contacts / notifier)
//!     ↓
//! infrastructure (基础设施：JsExecutor / Desktop / Fetcher)
//! ```

pub mod batch_processor;
pub mod portal;
pub mod run_controller;

pub use batch_processor::App;
pub use portal::{prepare_session, PortalSettings};
pub use run_controller::{RunController, RunSummary};
