mod common;

use std::sync::Arc;
use std::time::Duration;

use resume_relay::error::FailureKind;
use resume_relay::models::AcquisitionStrategy;
use resume_relay::orchestrator::RunController;
use resume_relay::services::NamedTarget;
use resume_relay::workflow::{RecordOutcome, Stage};

use common::{record, Harness};

fn controller(h: &Harness) -> RunController {
    RunController::new(
        h.pipeline(),
        h.state.clone(),
        h.schedule.pause_poll,
        h.notifier.clone(),
    )
}

#[tokio::test]
async fn test_three_row_table_end_to_end() {
    let h = Harness::new()
        .with_contact("渋谷", "田中")
        .with_contact("新宿", "佐藤");
    let records = vec![
        record("R1", "山田", 30, "渋谷"),
        record("R2", "木村", 55, "新宿"),
        record("R3", "斎藤", 40, "池袋"),
    ];

    let summary = controller(&h).run(&records).await;

    assert!(!summary.aborted);
    let outcomes: Vec<_> = summary.reports.iter().map(|r| r.outcome.clone()).collect();
    assert_eq!(outcomes[0], RecordOutcome::Done(AcquisitionStrategy::DirectFetch));
    assert_eq!(outcomes[1], RecordOutcome::Skipped);
    assert_eq!(outcomes[2].failure_kind(), Some(FailureKind::MissingContact));

    let searching: usize = summary
        .reports
        .iter()
        .map(|r| r.entered(Stage::Searching))
        .sum();
    assert_eq!(searching, 2);

    let ids: Vec<_> = summary.reports.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(ids, vec!["R1", "R2", "R3"]);
    assert_eq!((summary.done(), summary.skipped(), summary.failed()), (1, 1, 1));
    assert_eq!(summary.failures_by_kind(), vec![(FailureKind::MissingContact, 1)]);

    // 只有第 1 行发出了通知，未配置汇总收件人
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_summary_notification_after_completed_run() {
    let h = Harness::new().with_contact("渋谷", "田中");
    let records = vec![record("R1", "山田", 60, "渋谷")];

    let summary = controller(&h)
        .with_summary(Some("boss@example.test".to_string()), "処理結果")
        .run(&records)
        .await;

    assert_eq!(summary.skipped(), 1);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "boss@example.test");
    assert!(sent[0].attachments.is_empty());
    assert!(sent[0].body.contains("スキップ: 1"));
}

#[tokio::test]
async fn test_aborted_run_sends_no_summary() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.state.stop();
    let records = vec![record("R1", "山田", 30, "渋谷")];

    let summary = controller(&h)
        .with_summary(Some("boss@example.test".to_string()), "処理結果")
        .run(&records)
        .await;

    assert!(summary.aborted);
    assert!(summary.reports.is_empty());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.web.calls(), 0);
}

#[tokio::test]
async fn test_pause_halts_progress_until_resumed() {
    let h = Harness::new().with_contact("渋谷", "田中");
    let records = vec![
        record("R1", "山田", 30, "渋谷"),
        record("R2", "木村", 31, "渋谷"),
    ];
    h.state.set_paused(true);

    let controller = Arc::new(controller(&h));
    let task = {
        let controller = controller.clone();
        let records = records.clone();
        tokio::spawn(async move { controller.run(&records).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.web.calls(), 0);
    assert_eq!(h.fetcher.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(!task.is_finished());

    h.state.set_paused(false);
    let summary = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert!(!summary.aborted);
    let ids: Vec<_> = summary.reports.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(ids, vec!["R1", "R2"]);
    assert_eq!(summary.done(), 2);
    assert_eq!(h.notifier.sent().len(), 2);
}

#[tokio::test]
async fn test_pause_mid_record_resumes_at_next_stage() {
    let h = Harness::new().with_contact("渋谷", "田中");
    h.web.pause_when_clicked(NamedTarget::SearchButton, h.state.clone());
    let records = vec![
        record("R1", "山田", 30, "渋谷"),
        record("R2", "木村", 31, "渋谷"),
    ];

    let controller = Arc::new(controller(&h));
    let task = {
        let controller = controller.clone();
        let records = records.clone();
        tokio::spawn(async move { controller.run(&records).await })
    };

    tokio::time::timeout(Duration::from_secs(2), async {
        while !h.state.is_paused() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // 进行中的搜索步骤走到下一个挂起点后不再有任何动作
    tokio::time::sleep(Duration::from_millis(150)).await;
    let web_calls = h.web.calls();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.web.calls(), web_calls);
    assert_eq!(h.fetcher.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(h.web.is_detail_open());
    assert!(!task.is_finished());

    h.state.set_paused(false);
    let summary = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert!(!summary.aborted);
    let ids: Vec<_> = summary.reports.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(ids, vec!["R1", "R2"]);
    for report in &summary.reports {
        assert_eq!(report.entered(Stage::Searching), 1);
        assert_eq!(report.entered(Stage::DetailOpen), 1);
        assert_eq!(report.entered(Stage::Closing), 1);
    }
    assert_eq!(summary.done(), 2);
    assert_eq!(h.web.clicks_on(NamedTarget::SearchButton), 2);
    assert_eq!(h.fetcher.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(h.notifier.sent().len(), 2);
}
