//! 控制面（Control Plane）
//!
//! 运行状态标志、操作员热键、轮询间隔与重试策略。
//! 不持有任何候选人数据。

pub mod retry;
pub mod run_state;
pub mod schedule;
pub mod signal_monitor;

pub use retry::{with_retry, RetryPolicy};
pub use run_state::RunState;
pub use schedule::{poll_until, Schedule};
pub use signal_monitor::{
    exit_after, AbortHandler, GlobalKeyboard, Hotkey, KeySource, SignalConfig, SignalMonitor,
};
