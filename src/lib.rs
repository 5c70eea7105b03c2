//! # Resume Relay
//!
//! 招聘后台应募者简历的自动转发工具：
//! 导出候选人表格 → 逐条搜索打开详情 → 获取简历 PDF → 通知对应拠点 → 更新状态
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page、屏幕、键鼠、HTTP 客户端），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，实现 `WebSession`
//! - `SystemDesktop` - 截图 + 键鼠模拟，实现 `Desktop`
//!
//! ### ② 控制面（Control）
//! - `control/` - `RunState` 标志、热键监控、轮询间隔、重试策略
//!
//! ### ③ 业务能力层（Services）
//! - `Locator` - DOM / 图像目标的统一等待与操作
//! - `DownloadWatcher` - 目录快照对比检测下载完成
//! - `ContactBook` / `WebhookNotifier` - 联系人目录与通知通道
//!
//! ### ④ 流程层（Workflow）
//! - `RecordPipeline` - 单条候选人的状态机
//!
//! ### ⑤ 编排层（Orchestration）
//! - `RunController` - 逐条处理、暂停 / 终止控制、结果汇总
//! - `App` - 应用生命周期

pub mod browser;
pub mod config;
pub mod control;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use control::{RetryPolicy, RunState, Schedule};
pub use error::{AutomationError, FailureKind, Result};
pub use models::{AcquisitionStrategy, Attachment, Contact, Record};
pub use orchestrator::{App, RunController, RunSummary};
pub use services::{Locator, NamedTarget, TargetSet};
pub use workflow::{RecordCtx, RecordOutcome, RecordPipeline, RecordReport, Stage};
