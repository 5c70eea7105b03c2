//! 测试用假实现：浏览器、桌面、下载、联系人、通知

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use rdev::Key;
use tempfile::TempDir;

use resume_relay::control::{RetryPolicy, RunState, Schedule};
use resume_relay::error::{AutomationError, Result};
use resume_relay::infrastructure::{
    Desktop, DocumentFetcher, DomCondition, DomSelector, MouseButton, Point, Screen,
    SessionCredentials, WebSession,
};
use resume_relay::models::{Contact, Record};
use resume_relay::services::{
    ContactBook, Locate, Locator, MailTemplate, NamedTarget, Notification, Notifier, TargetSet,
};
use resume_relay::workflow::{PipelineDeps, PipelineSettings, RecordPipeline};

// ========== 浏览器 ==========

pub struct FakeWeb {
    names: Vec<(DomSelector, NamedTarget)>,
    /// 所有 WebSession 调用次数
    pub calls: AtomicUsize,
    missing: Mutex<HashSet<NamedTarget>>,
    detail_open: AtomicBool,
    search_term: Mutex<String>,
    pub clicks: Mutex<Vec<NamedTarget>>,
    pub selections: Mutex<Vec<(NamedTarget, String)>>,
    /// 接下来这么多次 probe 返回错误（模拟页面跳转中的 evaluate 失败）
    probe_failures: AtomicUsize,
    /// 目标在首次被探测后经过指定时间才出现
    late: Mutex<HashMap<NamedTarget, (Duration, Option<Instant>)>>,
    /// 结果行在搜索后先显示这么多次旧内容
    stale_reads: AtomicUsize,
    /// 在结果行仍是旧内容时点击了它
    pub stale_row_clicks: AtomicUsize,
    /// 第一次点击该目标时把运行状态切到暂停
    pause_on: Mutex<Option<(NamedTarget, Arc<RunState>)>>,
}

impl FakeWeb {
    pub fn new(targets: &TargetSet) -> Self {
        let names = NamedTarget::ALL
            .into_iter()
            .filter_map(|name| match &targets.get(name)?.locate {
                Locate::Dom(dom) => Some((dom.selector.clone(), name)),
                Locate::Image(_) => None,
            })
            .collect();
        Self {
            names,
            calls: AtomicUsize::new(0),
            missing: Mutex::new(HashSet::new()),
            detail_open: AtomicBool::new(false),
            search_term: Mutex::new(String::new()),
            clicks: Mutex::new(Vec::new()),
            selections: Mutex::new(Vec::new()),
            probe_failures: AtomicUsize::new(0),
            late: Mutex::new(HashMap::new()),
            stale_reads: AtomicUsize::new(0),
            stale_row_clicks: AtomicUsize::new(0),
            pause_on: Mutex::new(None),
        }
    }

    pub fn fail_probes(&self, count: usize) {
        self.probe_failures.store(count, Ordering::SeqCst);
    }

    pub fn appear_after(&self, name: NamedTarget, delay: Duration) {
        self.late.lock().unwrap().insert(name, (delay, None));
    }

    pub fn stale_results(&self, reads: usize) {
        self.stale_reads.store(reads, Ordering::SeqCst);
    }

    pub fn pause_when_clicked(&self, name: NamedTarget, state: Arc<RunState>) {
        *self.pause_on.lock().unwrap() = Some((name, state));
    }

    /// 让某个目标永远找不到
    pub fn hide(&self, name: NamedTarget) {
        self.missing.lock().unwrap().insert(name);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn clicks_on(&self, name: NamedTarget) -> usize {
        self.clicks.lock().unwrap().iter().filter(|n| **n == name).count()
    }

    pub fn is_detail_open(&self) -> bool {
        self.detail_open.load(Ordering::SeqCst)
    }

    fn name_of(&self, selector: &DomSelector) -> Option<NamedTarget> {
        self.names
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, name)| *name)
    }

    fn visible(&self, selector: &DomSelector) -> bool {
        let Some(name) = self.name_of(selector) else {
            return false;
        };
        if self.missing.lock().unwrap().contains(&name) {
            return false;
        }
        if let Some((delay, first_seen)) = self.late.lock().unwrap().get_mut(&name) {
            let since = *first_seen.get_or_insert_with(Instant::now);
            if since.elapsed() < *delay {
                return false;
            }
        }
        if name == NamedTarget::OverlayClose {
            return self.detail_open.load(Ordering::SeqCst);
        }
        true
    }
}

#[async_trait]
impl WebSession for FakeWeb {
    async fn probe(&self, selector: &DomSelector, _condition: DomCondition) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .probe_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AutomationError::Script("Execution context was destroyed".to_string()));
        }
        Ok(self.visible(selector))
    }

    async fn click(&self, selector: &DomSelector) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = self
            .name_of(selector)
            .ok_or_else(|| AutomationError::Script(format!("unknown {}", selector)))?;
        if name == NamedTarget::ResultRow && self.stale_reads.load(Ordering::SeqCst) > 0 {
            self.stale_row_clicks.fetch_add(1, Ordering::SeqCst);
        }
        {
            let mut pause_on = self.pause_on.lock().unwrap();
            if pause_on.as_ref().is_some_and(|(n, _)| *n == name) {
                if let Some((_, state)) = pause_on.take() {
                    state.set_paused(true);
                }
            }
        }
        match name {
            NamedTarget::ResultRow | NamedTarget::ResultCell => {
                self.detail_open.store(true, Ordering::SeqCst)
            }
            NamedTarget::OverlayClose => self.detail_open.store(false, Ordering::SeqCst),
            _ => {}
        }
        self.clicks.lock().unwrap().push(name);
        Ok(())
    }

    async fn fill(&self, selector: &DomSelector, text: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.name_of(selector) == Some(NamedTarget::SearchBox) {
            *self.search_term.lock().unwrap() = text.to_string();
        }
        Ok(())
    }

    async fn read_attribute(&self, selector: &DomSelector, name: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let target = self.name_of(selector);
        if target.is_some() && !self.visible(selector) {
            return Err(AutomationError::not_found(selector.to_string(), Duration::ZERO));
        }
        let term = self.search_term.lock().unwrap().clone();
        match (target, name) {
            (Some(NamedTarget::ResumeLink), "href") => {
                Ok(Some(format!("https://portal.test/resume/{}.pdf", term)))
            }
            (Some(NamedTarget::ResultRow), "textContent") => {
                let stale = self
                    .stale_reads
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if stale {
                    Ok(Some("前回の候補者 事務".to_string()))
                } else {
                    Ok(Some(format!("{} 販売", term)))
                }
            }
            _ => Ok(None),
        }
    }

    async fn select_value(&self, selector: &DomSelector, value: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = self.name_of(selector) {
            self.selections
                .lock()
                .unwrap()
                .push((name, value.to_string()));
        }
        Ok(())
    }

    async fn goto(&self, _url: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![("sid".to_string(), "abc".to_string())])
    }

    async fn user_agent(&self) -> Result<String> {
        Ok("FakeAgent/1.0".to_string())
    }
}

// ========== 桌面 ==========

pub struct FakeDesktop {
    pub screen: Mutex<RgbaImage>,
    pub captures: AtomicUsize,
    pub clicks: Mutex<Vec<(Point, MouseButton)>>,
    pub presses: Mutex<Vec<Key>>,
    pub hotkeys: Mutex<Vec<Vec<Key>>>,
    /// 设置后，按 Enter 会在该目录生成一个已保存的 PDF
    save_dir: Mutex<Option<PathBuf>>,
}

impl Default for FakeDesktop {
    fn default() -> Self {
        Self {
            screen: Mutex::new(RgbaImage::from_pixel(64, 48, Rgba([200, 200, 200, 255]))),
            captures: AtomicUsize::new(0),
            clicks: Mutex::new(Vec::new()),
            presses: Mutex::new(Vec::new()),
            hotkeys: Mutex::new(Vec::new()),
            save_dir: Mutex::new(None),
        }
    }
}

impl FakeDesktop {
    pub fn save_dialog_into(&self, dir: PathBuf) {
        *self.save_dir.lock().unwrap() = Some(dir);
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Desktop for FakeDesktop {
    async fn capture(&self) -> Result<Screen> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(Screen {
            image: self.screen.lock().unwrap().clone(),
            origin: (0, 0),
        })
    }

    async fn click_at(&self, point: Point, button: MouseButton) -> Result<()> {
        self.clicks.lock().unwrap().push((point, button));
        Ok(())
    }

    async fn press(&self, key: Key) -> Result<()> {
        self.presses.lock().unwrap().push(key);
        if key == Key::Return {
            let dir = self.save_dir.lock().unwrap().clone();
            if let Some(dir) = dir {
                std::fs::write(dir.join("viewer_download.pdf"), b"%PDF-1.4 saved")?;
            }
        }
        Ok(())
    }

    async fn hotkey(&self, keys: &[Key]) -> Result<()> {
        self.hotkeys.lock().unwrap().push(keys.to_vec());
        Ok(())
    }
}

// ========== 下载 ==========

#[derive(Default)]
pub struct FakeFetcher {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl DocumentFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, credentials: &SessionCredentials) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((url.to_string(), credentials.cookie_header()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(AutomationError::Io(std::io::Error::other("HTTP 403")));
        }
        Ok(b"%PDF-1.4 direct".to_vec())
    }
}

// ========== 通知 ==========

#[derive(Default)]
pub struct FakeNotifier {
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<Notification>>,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AutomationError::dispatch_failed(&notification.to, "smtp down"));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ========== 组装 ==========

pub struct Harness {
    pub dir: TempDir,
    pub targets: Arc<TargetSet>,
    pub web: Arc<FakeWeb>,
    pub desktop: Arc<FakeDesktop>,
    pub fetcher: Arc<FakeFetcher>,
    pub notifier: Arc<FakeNotifier>,
    pub contacts: ContactBook,
    pub state: Arc<RunState>,
    pub schedule: Schedule,
}

impl Harness {
    pub fn new() -> Self {
        let targets = TargetSet::dom_defaults();
        let web = Arc::new(FakeWeb::new(&targets));
        Self {
            dir: tempfile::tempdir().unwrap(),
            targets: Arc::new(targets),
            web,
            desktop: Arc::new(FakeDesktop::default()),
            fetcher: Arc::new(FakeFetcher::default()),
            notifier: Arc::new(FakeNotifier::default()),
            contacts: ContactBook::default(),
            state: Arc::new(RunState::new()),
            schedule: Schedule::uniform(Duration::from_millis(5)),
        }
    }

    pub fn with_contact(mut self, branch: &str, person: &str) -> Self {
        self.contacts.insert(
            branch,
            Contact {
                address: format!("{}@example.test", person),
                cc: "hq@example.test".to_string(),
                display_name: person.to_string(),
            },
        );
        self
    }

    pub fn download_dir(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            download_dir: self.download_dir(),
            element_timeout: Duration::from_millis(60),
            close_timeout: Duration::from_millis(20),
            download_timeout: Duration::from_millis(150),
            done_status: "04".to_string(),
            template: MailTemplate::new("応募者レジュメ送付", "ご確認ください。"),
            schedule: self.schedule.clone(),
            retry: RetryPolicy::new(2, Duration::from_millis(1), 1.0),
        }
    }

    pub fn locator(&self) -> Arc<Locator> {
        Arc::new(Locator::new(
            self.web.clone(),
            self.desktop.clone(),
            self.schedule.locator_poll,
        ))
    }

    pub fn pipeline(&self) -> RecordPipeline {
        self.pipeline_with(self.settings())
    }

    pub fn pipeline_with(&self, settings: PipelineSettings) -> RecordPipeline {
        let deps = PipelineDeps {
            locator: self.locator(),
            targets: self.targets.clone(),
            fetcher: self.fetcher.clone(),
            contacts: Arc::new(self.contacts.clone()),
            notifier: self.notifier.clone(),
            state: self.state.clone(),
        };
        RecordPipeline::new(deps, settings)
    }
}

pub fn record(identifier: &str, name: &str, age: u32, branch: &str) -> Record {
    Record {
        identifier: identifier.to_string(),
        full_name: name.to_string(),
        contact_address: format!("{}@mail.test", identifier),
        branch_label: branch.to_string(),
        role_label: "販売".to_string(),
        age,
    }
}
