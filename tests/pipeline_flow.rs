mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use rdev::Key;
use resume_relay::control::RetryPolicy;
use resume_relay::error::FailureKind;
use resume_relay::models::{AcquisitionStrategy, AttachmentKind};
use resume_relay::services::NamedTarget;
use resume_relay::workflow::{AcquireMode, RecordCtx, RecordOutcome, Stage};

use common::{record, Harness};

fn ctx(r: &resume_relay::Record) -> RecordCtx {
    RecordCtx::new(1, 1, r)
}

#[tokio::test]
async fn test_age_at_limit_is_skipped_without_touching_browser() {
    let h = Harness::new().with_contact("渋谷", "田中");
    let pipeline = h.pipeline();
    let r = record("A1", "山田太郎", 55, "渋谷");

    let report = pipeline.run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome, RecordOutcome::Skipped);
    assert_eq!(report.trace, vec![Stage::Idle, Stage::Done]);
    assert!(report.attachment.is_none());
    assert_eq!(h.web.calls(), 0);
    assert_eq!(h.desktop.captures(), 0);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_age_54_is_processed() {
    let h = Harness::new().with_contact("渋谷", "田中");
    let r = record("A1", "山田太郎", 54, "渋谷");
    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();
    assert_eq!(report.outcome, RecordOutcome::Done(AcquisitionStrategy::DirectFetch));
}

#[tokio::test]
async fn test_direct_fetch_happy_path() {
    let h = Harness::new().with_contact("渋谷", "田中");
    let r = record("A1", "山田太郎", 30, "渋谷");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome, RecordOutcome::Done(AcquisitionStrategy::DirectFetch));
    assert_eq!(
        report.trace,
        vec![
            Stage::Idle,
            Stage::Searching,
            Stage::DetailOpen,
            Stage::AcquiringDocument(AcquireMode::Direct),
            Stage::Notifying,
            Stage::StatusUpdating,
            Stage::Closing,
            Stage::Done,
        ]
    );

    let attachment = report.attachment.unwrap();
    let expected = h.download_dir().join("山田太郎_渋谷_販売.pdf");
    assert_eq!(attachment.path, expected);
    assert_eq!(std::fs::read(&expected).unwrap(), b"%PDF-1.4 direct");
    assert!(!h.download_dir().join("山田太郎_渋谷_販売.pdf.part").exists());

    // 复用浏览器 cookie
    let seen = h.fetcher.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "https://portal.test/resume/山田太郎.pdf");
    assert_eq!(seen[0].1, "sid=abc");

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "田中@example.test");
    assert_eq!(sent[0].attachments, vec![expected]);
    assert!(sent[0].body.starts_with("田中 さん"));

    let selections = h.web.selections.lock().unwrap().clone();
    assert_eq!(selections, vec![(NamedTarget::StatusSelect, "04".to_string())]);
    assert_eq!(h.web.clicks_on(NamedTarget::OverlayClose), 1);
    assert!(!h.web.is_detail_open());
}

#[tokio::test]
async fn test_falls_back_to_screen_save_when_fetch_fails() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.fetcher.fail.store(true, Ordering::SeqCst);
    std::fs::create_dir_all(h.download_dir()).unwrap();
    h.desktop.save_dialog_into(h.download_dir());
    let r = record("A2", "佐藤花子", 41, "渋谷");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome, RecordOutcome::Done(AcquisitionStrategy::ScreenSave));
    assert_eq!(report.entered(Stage::AcquiringDocument(AcquireMode::Direct)), 1);
    assert_eq!(report.entered(Stage::AcquiringDocument(AcquireMode::ScreenFallback)), 1);

    let attachment = report.attachment.unwrap();
    assert_eq!(attachment.path, h.download_dir().join("佐藤花子_渋谷_販売.pdf"));
    assert!(attachment.path.exists());
    assert_eq!(h.web.clicks_on(NamedTarget::ResumeLink), 1);

    let presses = h.desktop.presses.lock().unwrap().clone();
    assert_eq!(presses.iter().filter(|k| **k == Key::DownArrow).count(), 4);
    let hotkeys = h.desktop.hotkeys.lock().unwrap().clone();
    assert_eq!(hotkeys, vec![vec![Key::ControlLeft, Key::KeyW]]);

    assert_eq!(h.notifier.sent()[0].attachments, vec![attachment.path]);
}

#[tokio::test]
async fn test_screenshot_is_last_resort() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.fetcher.fail.store(true, Ordering::SeqCst);
    let r = record("A3", "鈴木一郎", 29, "渋谷");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome, RecordOutcome::Done(AcquisitionStrategy::Screenshot));
    let attachment = report.attachment.unwrap();
    assert_eq!(attachment.kind(), AttachmentKind::Image);
    assert_eq!(attachment.path, h.download_dir().join("鈴木一郎_渋谷_販売.png"));
    assert!(attachment.path.exists());
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_missing_contact_stops_record_before_notify() {
    let h = Harness::new().with_contact("渋谷", "田中");
    let r = record("A4", "高橋", 35, "池袋");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    match &report.outcome {
        RecordOutcome::Failed { kind, stage, .. } => {
            assert_eq!(*kind, FailureKind::MissingContact);
            assert_eq!(*stage, Stage::AcquiringDocument(AcquireMode::Direct));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(report.attachment.is_some());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(report.entered(Stage::Notifying), 0);
    assert_eq!(report.entered(Stage::Closing), 1);
    assert_eq!(report.trace.last(), Some(&Stage::Error));
    assert_eq!(h.web.clicks_on(NamedTarget::OverlayClose), 1);
}

#[tokio::test]
async fn test_dispatch_failure_skips_status_update() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.notifier.fail.store(true, Ordering::SeqCst);
    let r = record("A5", "伊藤", 33, "渋谷");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome.failure_kind(), Some(FailureKind::DispatchFailure));
    assert_eq!(report.entered(Stage::StatusUpdating), 0);
    assert_eq!(report.entered(Stage::Closing), 1);
    assert!(h.web.selections.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_status_update_failure_does_not_block_closing() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.web.hide(NamedTarget::StatusSelect);
    let r = record("A6", "渡辺", 45, "渋谷");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome, RecordOutcome::Done(AcquisitionStrategy::DirectFetch));
    assert_eq!(report.entered(Stage::Closing), 1);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_search_failure_still_closes_once_without_error() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.web.hide(NamedTarget::SearchBox);
    let r = record("A7", "中村", 38, "渋谷");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    match &report.outcome {
        RecordOutcome::Failed { kind, stage, .. } => {
            assert_eq!(*kind, FailureKind::NotFound);
            assert_eq!(*stage, Stage::Searching);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(report.attachment.is_none());
    assert_eq!(report.entered(Stage::Closing), 1);
    // 详情未打开，关闭动作不点击也不报错
    assert_eq!(h.web.clicks_on(NamedTarget::OverlayClose), 0);
}

#[tokio::test]
async fn test_row_click_falls_back_to_first_cell() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.web.hide(NamedTarget::ResultRow);
    let r = record("A8", "小林", 27, "渋谷");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome, RecordOutcome::Done(AcquisitionStrategy::DirectFetch));
    assert_eq!(h.web.clicks_on(NamedTarget::ResultRow), 0);
    assert_eq!(h.web.clicks_on(NamedTarget::ResultCell), 1);
}

#[tokio::test]
async fn test_late_target_is_absorbed_by_retry() {
    let h = Harness::new().with_contact("渋谷", "田中");
    // 第一轮等待（60ms）内始终不可见，退避 300ms 后的第二轮可见
    h.web.appear_after(NamedTarget::SearchButton, Duration::from_millis(150));
    let mut settings = h.settings();
    settings.retry = RetryPolicy::new(2, Duration::from_millis(300), 1.0);
    let r = record("B1", "松本", 33, "渋谷");

    let report = h.pipeline_with(settings).run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome, RecordOutcome::Done(AcquisitionStrategy::DirectFetch));
    assert_eq!(report.entered(Stage::Searching), 1);
    assert_eq!(h.web.clicks_on(NamedTarget::SearchButton), 1);
}

#[tokio::test]
async fn test_late_target_without_retry_fails_as_not_found() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.web.appear_after(NamedTarget::SearchButton, Duration::from_millis(150));
    let mut settings = h.settings();
    settings.retry = RetryPolicy::new(1, Duration::from_millis(300), 1.0);
    let r = record("B2", "井上", 33, "渋谷");

    let report = h.pipeline_with(settings).run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome.failure_kind(), Some(FailureKind::NotFound));
    assert_eq!(h.web.clicks_on(NamedTarget::SearchButton), 0);
}

#[tokio::test]
async fn test_row_is_opened_only_after_results_refresh() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.web.stale_results(3);
    let r = record("B3", "木下", 29, "渋谷");

    let report = h.pipeline().run(&r, &ctx(&r)).await.unwrap();

    assert_eq!(report.outcome, RecordOutcome::Done(AcquisitionStrategy::DirectFetch));
    assert_eq!(h.web.clicks_on(NamedTarget::ResultRow), 1);
    assert_eq!(h.web.stale_row_clicks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stopped_state_aborts_record() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.state.stop();
    let r = record("A9", "加藤", 31, "渋谷");

    let err = h.pipeline().run(&r, &ctx(&r)).await.unwrap_err();
    assert!(matches!(err, resume_relay::AutomationError::FatalAbort));
    assert!(h.notifier.sent().is_empty());
}
