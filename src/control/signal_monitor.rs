//! 操作员热键监控
//!
//! 两个独立的后台 watcher 定期采样全局键盘状态：
//! - 终止键：置 `running=false`，执行清理钩子后立即结束进程
//! - 暂停组合键：切换 `paused`，带去抖
//!
//! 这里只修改 RunState，不接触候选人数据和浏览器。

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use rdev::{EventType, Key};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::control::run_state::RunState;
use crate::error::{AutomationError, Result};

/// 终止时的退出码
pub const ABORT_EXIT_CODE: i32 = 130;

/// 热键中的一个位置，任一候选键按下即视为满足（左右修饰键）
#[derive(Debug, Clone, PartialEq)]
pub struct KeySlot(Vec<Key>);

/// 组合键：所有位置同时按下
#[derive(Debug, Clone, PartialEq)]
pub struct Hotkey {
    label: String,
    slots: Vec<KeySlot>,
}

impl Hotkey {
    /// 解析 `"Alt+Space"` / `"Escape"` / `"Ctrl+Shift+F12"` 形式的热键
    pub fn parse(spec: &str) -> Result<Self> {
        let slots = spec
            .split('+')
            .map(|part| parse_key(part.trim()).map(KeySlot))
            .collect::<Result<Vec<_>>>()?;
        if slots.is_empty() {
            return Err(AutomationError::Config(format!("热键为空: {:?}", spec)));
        }
        Ok(Self {
            label: spec.to_string(),
            slots,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_held(&self, source: &dyn KeySource) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.0.iter().any(|key| source.is_pressed(*key)))
    }
}

fn parse_key(name: &str) -> Result<Vec<Key>> {
    let keys = match name.to_ascii_lowercase().as_str() {
        "esc" | "escape" => vec![Key::Escape],
        "space" => vec![Key::Space],
        "enter" | "return" => vec![Key::Return],
        "tab" => vec![Key::Tab],
        "alt" => vec![Key::Alt, Key::AltGr],
        "ctrl" | "control" => vec![Key::ControlLeft, Key::ControlRight],
        "shift" => vec![Key::ShiftLeft, Key::ShiftRight],
        "meta" | "win" | "cmd" => vec![Key::MetaLeft, Key::MetaRight],
        "pause" => vec![Key::Pause],
        "f1" => vec![Key::F1],
        "f2" => vec![Key::F2],
        "f3" => vec![Key::F3],
        "f4" => vec![Key::F4],
        "f5" => vec![Key::F5],
        "f6" => vec![Key::F6],
        "f7" => vec![Key::F7],
        "f8" => vec![Key::F8],
        "f9" => vec![Key::F9],
        "f10" => vec![Key::F10],
        "f11" => vec![Key::F11],
        "f12" => vec![Key::F12],
        "q" => vec![Key::KeyQ],
        "p" => vec![Key::KeyP],
        "s" => vec![Key::KeyS],
        "x" => vec![Key::KeyX],
        other => {
            return Err(AutomationError::Config(format!("无法识别的按键: {}", other)));
        }
    };
    Ok(keys)
}

/// 全局键盘状态来源
pub trait KeySource: Send + Sync {
    fn is_pressed(&self, key: Key) -> bool;
}

/// 基于 rdev 全局监听的键盘状态
///
/// 监听线程维护当前按下的键集合，watcher 只读取快照。
#[derive(Debug, Default)]
pub struct GlobalKeyboard {
    pressed: Mutex<Vec<Key>>,
}

impl GlobalKeyboard {
    /// 启动监听线程
    pub fn start() -> Arc<Self> {
        let keyboard = Arc::new(Self::default());
        let listener = keyboard.clone();
        std::thread::spawn(move || {
            if let Err(e) = rdev::listen(move |event| listener.record(&event.event_type)) {
                error!("全局键盘监听失败: {:?}", e);
            }
        });
        keyboard
    }

    fn record(&self, event: &EventType) {
        let Ok(mut pressed) = self.pressed.lock() else {
            return;
        };
        match event {
            EventType::KeyPress(key) => {
                if !pressed.contains(key) {
                    pressed.push(*key);
                }
            }
            EventType::KeyRelease(key) => pressed.retain(|k| k != key),
            _ => {}
        }
    }
}

impl KeySource for GlobalKeyboard {
    fn is_pressed(&self, key: Key) -> bool {
        self.pressed
            .lock()
            .map(|pressed| pressed.contains(&key))
            .unwrap_or(false)
    }
}

/// 终止处理：执行清理后结束进程
pub type AbortHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// 默认终止处理：等待 `cleanup` 完成（释放浏览器等），再以 [`ABORT_EXIT_CODE`] 退出
pub fn exit_after<F, Fut>(cleanup: F) -> AbortHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cleanup = Arc::new(cleanup);
    Arc::new(move || {
        let cleanup = cleanup.clone();
        async move {
            cleanup().await;
            std::process::exit(ABORT_EXIT_CODE);
        }
        .boxed()
    })
}

#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub abort: Hotkey,
    pub pause: Hotkey,
    pub sample_interval: Duration,
    pub debounce: Duration,
}

/// 热键监控
pub struct SignalMonitor {
    abort_task: JoinHandle<()>,
    pause_task: JoinHandle<()>,
}

impl SignalMonitor {
    /// 启动两个 watcher
    pub fn spawn(
        state: Arc<RunState>,
        source: Arc<dyn KeySource>,
        config: SignalConfig,
        on_abort: AbortHandler,
    ) -> Self {
        info!(
            "⌨️ 热键监控已启动: 终止 [{}] / 暂停切换 [{}]",
            config.abort.label(),
            config.pause.label()
        );

        let abort_task = tokio::spawn(watch_abort(
            state.clone(),
            source.clone(),
            config.abort.clone(),
            config.sample_interval,
            on_abort,
        ));
        let pause_task = tokio::spawn(watch_pause(state, source, config));

        Self {
            abort_task,
            pause_task,
        }
    }

    pub fn shutdown(self) {
        self.abort_task.abort();
        self.pause_task.abort();
    }
}

async fn watch_abort(
    state: Arc<RunState>,
    source: Arc<dyn KeySource>,
    hotkey: Hotkey,
    interval: Duration,
    on_abort: AbortHandler,
) {
    while state.is_running() {
        if hotkey.is_held(source.as_ref()) {
            warn!("🛑 检测到 [{}]：强制终止", hotkey.label());
            state.stop();
            on_abort().await;
            return;
        }
        sleep(interval).await;
    }
}

async fn watch_pause(state: Arc<RunState>, source: Arc<dyn KeySource>, config: SignalConfig) {
    while state.is_running() {
        if config.pause.is_held(source.as_ref()) {
            let paused = state.toggle_pause();
            info!("▶ {}", if paused { "一时停止" } else { "再開" });
            sleep(config.debounce).await;
        }
        sleep(config.sample_interval).await;
    }
}
