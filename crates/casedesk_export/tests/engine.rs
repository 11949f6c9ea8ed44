use async_trait::async_trait;
use casedesk_api::testing::{Call, ScriptedCaseService};
use casedesk_api::{
    ApiError, ApiResult, Attachment, Case, CaseFilter, CaseId, CaseService, Comment, Download,
    ListPage, SearchHit,
};
use casedesk_export::{
    progress_channel, CancelToken, ExportEngine, ExportError, ExportFormat, ExportOptions,
    Formatter, Manifest, ProgressEvent, TaskStage,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;

fn engine(service: &Arc<ScriptedCaseService>, out: &Path, options: ExportOptions) -> ExportEngine {
    ExportEngine::new(
        service.clone(),
        Formatter::new(ExportFormat::Markdown).unwrap(),
        ExportOptions {
            output_dir: out.to_path_buf(),
            ..options
        },
    )
}

fn ids(numbers: &[usize]) -> Vec<CaseId> {
    numbers.iter().map(|n| ScriptedCaseService::id(*n)).collect()
}

#[tokio::test]
async fn test_parallelism_is_bounded() {
    let service = Arc::new(ScriptedCaseService::with_case_count(12));
    for n in 1..=12 {
        service.set_delay(&ScriptedCaseService::id(n), Duration::from_millis(5));
    }
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(
        &service,
        tmp.path(),
        ExportOptions {
            concurrency: 3,
            ..Default::default()
        },
    );

    let report = engine
        .run(ids(&(1..=12).collect::<Vec<_>>()), None, None, CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 12);
    assert!(service.max_in_flight() <= 3, "saw {}", service.max_in_flight());
    assert!(service.max_in_flight() >= 2);
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let service = Arc::new(ScriptedCaseService::with_case_count(5));
    service.fail(
        &ScriptedCaseService::id(2),
        Call::Case,
        ApiError::Status {
            code: 500,
            message: "boom".into(),
        },
    );
    service.fail(
        &ScriptedCaseService::id(4),
        Call::Comments,
        ApiError::Transport("reset".into()),
    );
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(&service, tmp.path(), ExportOptions::default());

    let report = engine
        .run(ids(&[1, 2, 3, 4, 5]), None, None, CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.total(), 5);
    assert_eq!(report.succeeded(), 4);
    assert_eq!(report.failed(), 1);
    assert!(!report.all_failed());
    assert!(report.manifest.is_complete());

    let failure = &report.manifest.failures[0];
    assert_eq!(failure.case_id, ScriptedCaseService::id(2));
    assert_eq!(failure.stage, TaskStage::Fetching);
    assert!(report.summary_line().starts_with("exported 4 of 5; see "));
    assert_eq!(report.partial_error().unwrap().failed, 1);

    assert!(tmp.path().join("C0001/case.md").exists());
    assert!(!tmp.path().join("C0002").exists());

    // Comments failed but the case still exported, flagged as partial.
    let partial = report
        .manifest
        .find_case(&ScriptedCaseService::id(4))
        .unwrap();
    assert_eq!(partial.missing, vec!["comments".to_string()]);
    let doc = std::fs::read_to_string(tmp.path().join("C0004/case.md")).unwrap();
    assert!(doc.contains("Partial export"));

    let saved = Manifest::load(&report.manifest_path).unwrap();
    assert_eq!(saved.cases.len(), 4);
    assert_eq!(saved.failures.len(), 1);
}

#[tokio::test]
async fn test_combined_output_keeps_input_order() {
    let service = Arc::new(ScriptedCaseService::with_case_count(3));
    service.set_delay(&ScriptedCaseService::id(3), Duration::from_millis(30));
    service.set_delay(&ScriptedCaseService::id(1), Duration::from_millis(10));
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(
        &service,
        tmp.path(),
        ExportOptions {
            combined: true,
            ..Default::default()
        },
    );

    let report = engine
        .run(ids(&[3, 1, 2]), None, None, CancelToken::new())
        .await
        .unwrap();

    let path = report.combined_path.clone().unwrap();
    assert_eq!(path, tmp.path().join("all-cases.md"));
    let doc = std::fs::read_to_string(&path).unwrap();
    let c3 = doc.find("# Case C0003").unwrap();
    let c1 = doc.find("# Case C0001").unwrap();
    let c2 = doc.find("# Case C0002").unwrap();
    assert!(c3 < c1 && c1 < c2);
    assert!(doc.contains("\n\n---\n\n# Case C0001"));

    assert_eq!(report.succeeded(), 3);
    assert!(report.manifest.cases.iter().all(|e| e.file == "all-cases.md"));
    assert!(!tmp.path().join("C0001").exists());
}

#[tokio::test]
async fn test_combined_write_failure_fails_buffered_cases() {
    let service = Arc::new(ScriptedCaseService::with_case_count(2));
    let tmp = tempfile::tempdir().unwrap();
    let blocked = tmp.path().join("blocked");
    std::fs::create_dir(&blocked).unwrap();
    let engine = engine(
        &service,
        tmp.path(),
        ExportOptions {
            combined: true,
            output_file: Some(blocked),
            ..Default::default()
        },
    );

    let report = engine
        .run(ids(&[1, 2]), None, None, CancelToken::new())
        .await
        .unwrap();

    assert!(report.all_failed());
    assert!(report.combined_path.is_none());
    assert!(report
        .manifest
        .failures
        .iter()
        .all(|f| f.stage == TaskStage::Writing));
}

#[tokio::test]
async fn test_cancellation_keeps_finished_cases_only() {
    let service = Arc::new(ScriptedCaseService::with_case_count(4));
    let third = ScriptedCaseService::id(3);
    service.gate(&third);
    let tmp = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine(
        &service,
        tmp.path(),
        ExportOptions {
            concurrency: 1,
            ..Default::default()
        },
    ));
    let cancel = CancelToken::new();

    let run = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run(ids(&[1, 2, 3, 4]), None, None, cancel).await })
    };

    while service.calls(Call::Case, &third) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(cancel.cancel());
    service.open_gate(&third);

    let report = run.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(
        report.manifest.case_ids(),
        vec![ScriptedCaseService::id(1), ScriptedCaseService::id(2)]
    );
    assert_eq!(report.failed(), 2);
    assert!(report.manifest.is_complete());

    let stages: Vec<_> = report.manifest.failures.iter().map(|f| f.stage).collect();
    assert_eq!(stages, vec![TaskStage::Fetching, TaskStage::Pending]);

    // The in-flight call finished, nothing after it ran.
    assert_eq!(service.calls(Call::Comments, &third), 0);
    assert_eq!(service.calls(Call::Case, &ScriptedCaseService::id(4)), 0);
    assert!(!tmp.path().join("C0003").exists());
    assert!(report.manifest_path.exists());
}

#[tokio::test]
async fn test_cancelled_combined_run_writes_finished_cases() {
    let service = Arc::new(ScriptedCaseService::with_case_count(4));
    let third = ScriptedCaseService::id(3);
    service.gate(&third);
    let tmp = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine(
        &service,
        tmp.path(),
        ExportOptions {
            concurrency: 1,
            combined: true,
            ..Default::default()
        },
    ));
    let cancel = CancelToken::new();

    let run = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run(ids(&[1, 2, 3, 4]), None, None, cancel).await })
    };

    while service.calls(Call::Case, &third) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(cancel.cancel());
    service.open_gate(&third);

    let report = run.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(
        report.manifest.case_ids(),
        vec![ScriptedCaseService::id(1), ScriptedCaseService::id(2)]
    );
    assert!(report.manifest.cases.iter().all(|e| e.file == "all-cases.md"));
    assert_eq!(report.failed(), 2);

    let doc = std::fs::read_to_string(report.combined_path.clone().unwrap()).unwrap();
    let c1 = doc.find("# Case C0001").unwrap();
    let c2 = doc.find("# Case C0002").unwrap();
    assert!(c1 < c2);
    assert!(!doc.contains("C0003"));
    assert!(!doc.contains("C0004"));
}

#[tokio::test]
async fn test_manifest_is_stamped_with_run_start() {
    let service = Arc::new(ScriptedCaseService::with_case_count(1));
    service.set_delay(&ScriptedCaseService::id(1), Duration::from_millis(300));
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(&service, tmp.path(), ExportOptions::default());

    let started = chrono::Utc::now();
    let report = engine
        .run(ids(&[1]), None, None, CancelToken::new())
        .await
        .unwrap();
    let finished = chrono::Utc::now();

    let exported_at = report.manifest.exported_at;
    assert!(exported_at >= started);
    assert!(
        exported_at - started < chrono::Duration::milliseconds(200),
        "stamped {} after start, run took {}",
        exported_at - started,
        finished - started
    );
}

#[tokio::test]
async fn test_progress_reports_completed_steps() {
    let service = Arc::new(ScriptedCaseService::with_case_count(1));
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(&service, tmp.path(), ExportOptions::default());
    let (tx, mut rx) = progress_channel(256);

    engine
        .run(ids(&[1]), None, Some(tx), CancelToken::new())
        .await
        .unwrap();

    let mut steps: Vec<String> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        steps.push(event.current_step);
    }
    let position = |step: &str| {
        steps
            .iter()
            .position(|s| s == step)
            .unwrap_or_else(|| panic!("no '{}' event in {:?}", step, steps))
    };
    assert!(position("fetching case") < position("fetched case"));
    assert!(position("fetched comments") < position("fetched attachments"));
    assert!(position("formatting") < position("formatted"));
    assert!(position("writing") < position("written"));
    assert_eq!(steps.last().map(String::as_str), Some("done"));
}

/// Delegates to a scripted service but panics fetching one case.
struct PanicsOn {
    inner: ScriptedCaseService,
    id: CaseId,
}

#[async_trait]
impl CaseService for PanicsOn {
    async fn list_cases(
        &self,
        filter: &CaseFilter,
        offset: usize,
        limit: usize,
    ) -> ApiResult<ListPage> {
        self.inner.list_cases(filter, offset, limit).await
    }

    async fn get_case(&self, id: &CaseId) -> ApiResult<Case> {
        if *id == self.id {
            panic!("service blew up on {}", id);
        }
        self.inner.get_case(id).await
    }

    async fn get_comments(&self, id: &CaseId) -> ApiResult<Vec<Comment>> {
        self.inner.get_comments(id).await
    }

    async fn get_attachments(&self, id: &CaseId) -> ApiResult<Vec<Attachment>> {
        self.inner.get_attachments(id).await
    }

    async fn download_attachment(
        &self,
        id: &CaseId,
        attachment_id: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ApiResult<Download> {
        self.inner.download_attachment(id, attachment_id, sink).await
    }

    async fn search(&self, query: &str, limit: usize) -> ApiResult<Vec<SearchHit>> {
        self.inner.search(query, limit).await
    }
}

#[tokio::test]
async fn test_crashed_task_is_reported_as_failed() {
    let service = Arc::new(PanicsOn {
        inner: ScriptedCaseService::with_case_count(2),
        id: ScriptedCaseService::id(2),
    });
    let tmp = tempfile::tempdir().unwrap();
    let engine = ExportEngine::new(
        service,
        Formatter::new(ExportFormat::Markdown).unwrap(),
        ExportOptions {
            output_dir: tmp.path().to_path_buf(),
            ..Default::default()
        },
    );
    let (tx, mut rx) = progress_channel(256);

    let report = engine
        .run(ids(&[1, 2]), None, Some(tx), CancelToken::new())
        .await
        .unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.manifest.failures[0].stage, TaskStage::Failed);

    let mut finished_c2 = None;
    while let Ok(event) = rx.try_recv() {
        if event.current_task == "C0002" {
            finished_c2 = Some(event.current_step);
        }
    }
    assert_eq!(finished_c2.as_deref(), Some("failed"));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_complete() {
    let service = Arc::new(ScriptedCaseService::with_case_count(6));
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(
        &service,
        tmp.path(),
        ExportOptions {
            concurrency: 2,
            ..Default::default()
        },
    );
    let (tx, mut rx) = progress_channel(1024);

    engine
        .run(ids(&[1, 2, 3, 4, 5, 6]), None, Some(tx), CancelToken::new())
        .await
        .unwrap();

    let mut events: Vec<ProgressEvent> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(pair[0].completed_tasks <= pair[1].completed_tasks);
    }
    assert!(events.iter().all(|e| e.completed_tasks <= e.total_tasks));
    let last = events.last().unwrap();
    assert_eq!(last.completed_tasks, 6);
    assert!(last.is_final());
}

#[tokio::test]
async fn test_stalled_consumer_does_not_block_run() {
    let service = Arc::new(ScriptedCaseService::with_case_count(5));
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(&service, tmp.path(), ExportOptions::default());
    let (tx, _rx) = progress_channel(1);

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        engine.run(ids(&[1, 2, 3, 4, 5]), None, Some(tx), CancelToken::new()),
    )
    .await
    .expect("export stalled on a full progress channel")
    .unwrap();

    assert_eq!(report.succeeded(), 5);
    assert!(report.dropped_progress > 0);
}

#[tokio::test]
async fn test_attachments_are_downloaded_best_effort() {
    let service = Arc::new(ScriptedCaseService::with_case_count(2));
    let first = ScriptedCaseService::id(1);
    let second = ScriptedCaseService::id(2);
    for id in [&first, &second] {
        service.add_attachment(
            id,
            Attachment {
                id: format!("{}-att", id),
                filename: "sosreport.tar.xz".into(),
                size: 5,
                ..Default::default()
            },
            b"hello".to_vec(),
        );
    }
    service.fail(&second, Call::Download, ApiError::Transport("reset".into()));
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(
        &service,
        tmp.path(),
        ExportOptions {
            include_attachments: true,
            ..Default::default()
        },
    );

    let report = engine
        .run(vec![first.clone(), second.clone()], None, None, CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    let saved = tmp.path().join("C0001/attachments/sosreport.tar.xz");
    assert_eq!(std::fs::read(saved).unwrap(), b"hello");

    let ok = report.manifest.find_case(&first).unwrap();
    assert_eq!((ok.attachment_count, ok.attachments_downloaded), (1, 1));
    let short = report.manifest.find_case(&second).unwrap();
    assert_eq!((short.attachment_count, short.attachments_downloaded), (1, 0));
    assert!(!tmp.path().join("C0002/attachments/sosreport.tar.xz").exists());
}

#[tokio::test]
async fn test_empty_input_writes_empty_manifest() {
    let service = Arc::new(ScriptedCaseService::new());
    let tmp = tempfile::tempdir().unwrap();
    let filter = CaseFilter {
        statuses: vec!["Closed".into()],
        ..Default::default()
    };
    let engine = engine(&service, tmp.path(), ExportOptions::default());

    let report = engine
        .run(Vec::new(), Some(filter.clone()), None, CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.total(), 0);
    assert!(!report.all_failed());
    assert!(report.partial_error().is_none());
    let saved = Manifest::load(&report.manifest_path).unwrap();
    assert_eq!(saved.filters_applied, Some(filter));
}

#[tokio::test]
async fn test_zero_concurrency_is_raised_to_one() {
    let service = Arc::new(ScriptedCaseService::with_case_count(3));
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(
        &service,
        tmp.path(),
        ExportOptions {
            concurrency: 0,
            ..Default::default()
        },
    );
    assert_eq!(engine.options().concurrency, 1);

    let report = engine
        .run(ids(&[1, 2, 3]), None, None, CancelToken::new())
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 3);
    assert_eq!(service.max_in_flight(), 1);
}

#[tokio::test]
async fn test_unusable_output_dir_is_a_run_error() {
    let service = Arc::new(ScriptedCaseService::with_case_count(1));
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("not-a-dir");
    std::fs::write(&file, "x").unwrap();
    let engine = engine(&service, &file.join("out"), ExportOptions::default());

    let err = engine
        .run(ids(&[1]), None, None, CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::CreateOutput { .. }));
    assert_eq!(service.total_calls(Call::Case), 0);
}

#[tokio::test]
async fn test_json_export_writes_case_json() {
    let service = Arc::new(ScriptedCaseService::with_case_count(1));
    let tmp = tempfile::tempdir().unwrap();
    let engine = ExportEngine::new(
        service.clone(),
        Formatter::new(ExportFormat::Json).unwrap(),
        ExportOptions {
            output_dir: tmp.path().to_path_buf(),
            ..Default::default()
        },
    );

    let report = engine
        .run(ids(&[1]), None, None, CancelToken::new())
        .await
        .unwrap();
    assert_eq!(report.manifest.cases[0].file, "C0001/case.json");
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("C0001/case.json")).unwrap())
            .unwrap();
    assert_eq!(value["case"]["summary"], "Case 1");
}
