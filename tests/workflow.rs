//! End-to-end workflow behaviour against scripted adapters.

mod common;

use common::{Harness, MockExtractor, RecordingObserver};
use edgequake_docflow::{
    BlobRef, CapabilityError, DocumentId, FailureKind, RecordStore, Stage, WorkflowConfig,
    WorkflowError, WorkflowObserver, WorkflowRecord, WorkflowStatus,
};
use std::sync::Arc;
use tokio::sync::Barrier;

fn status_trail(entries: &[edgequake_docflow::AuditEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.action == "update")
        .map(|e| e.note.clone())
        .collect()
}

#[tokio::test]
async fn document_runs_through_every_stage() {
    let h = Harness::new();
    h.seed("a1", "a.pdf").await;
    let driver = h.driver();

    let record = driver.run_workflow(&"a1".into()).await.unwrap();

    assert_eq!(record.status, WorkflowStatus::Completed);
    assert_eq!(record.extracted_text.as_deref(), Some("Hello world"));
    assert_eq!(record.summary.as_deref(), Some("Hello world."));
    assert_eq!(record.audio_path, Some(BlobRef::new("out/a1.mp3")));
    assert_eq!(record.image_path, Some(BlobRef::new("out/a1.png")));
    assert!(record.failure_reason.is_none());
    assert_eq!(h.counts(), [1, 1, 1, 1]);
    // The image prompt is the summary as-is.
    assert_eq!(*h.generator.prompts.lock().unwrap(), vec!["Hello world.".to_string()]);
}

#[tokio::test]
async fn statuses_are_visited_in_order() {
    let h = Harness::new();
    h.seed("a1", "a.pdf").await;
    h.driver().run_workflow(&"a1".into()).await.unwrap();

    let entries = h.store.audit(&"a1".into()).await.unwrap();
    let ranks: Vec<usize> = entries
        .iter()
        .filter(|e| e.action == "update")
        .map(|e| {
            let to = e.note.rsplit(' ').next().unwrap_or_default();
            WorkflowStatus::ORDER
                .iter()
                .position(|s| s.as_str() == to)
                .unwrap_or(usize::MAX)
        })
        .collect();

    assert_eq!(ranks, vec![1, 2, 3, 4, 5], "trail: {:?}", status_trail(&entries));
}

#[tokio::test]
async fn completed_record_is_returned_unchanged() {
    let h = Harness::new();
    h.seed("a1", "a.pdf").await;
    let driver = h.driver();

    let first = driver.run_workflow(&"a1".into()).await.unwrap();
    let second = driver.run_workflow(&"a1".into()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.counts(), [1, 1, 1, 1]);
}

#[tokio::test]
async fn resumes_from_summarized_without_resummarizing() {
    let h = Harness::new();
    let mut record = WorkflowRecord::new("a.pdf");
    record.id = DocumentId::from("a1");
    record.status = WorkflowStatus::Summarized;
    record.extracted_text = Some("Hello world".into());
    record.summary = Some("Hello world.".into());
    h.seed_at(record).await;

    let done = h.driver().run_workflow(&"a1".into()).await.unwrap();

    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(h.counts(), [0, 0, 1, 1]);
    let trail = status_trail(&h.store.audit(&"a1".into()).await.unwrap());
    assert_eq!(trail.len(), 3, "{trail:?}");
    assert!(trail[0].ends_with("audio_generated"), "{trail:?}");
    assert!(trail[1].ends_with("image_generated"), "{trail:?}");
    assert!(trail[2].ends_with("completed"), "{trail:?}");
}

#[tokio::test]
async fn concurrent_runs_commit_a_stage_once() {
    let h = Harness::with_extractor(MockExtractor {
        barrier: Some(Arc::new(Barrier::new(2))),
        ..Default::default()
    });
    h.seed("doc1", "a.pdf").await;
    let driver = h.driver();
    let id: DocumentId = "doc1".into();

    let (a, b) = tokio::join!(driver.run_workflow(&id), driver.run_workflow(&id));

    let (ok, conflict) = match (a, b) {
        (Ok(rec), Err(e)) | (Err(e), Ok(rec)) => (rec, e),
        other => panic!("expected one success and one conflict, got {other:?}"),
    };
    assert_eq!(ok.status, WorkflowStatus::Completed);
    assert!(matches!(conflict, WorkflowError::Conflict { .. }), "{conflict}");
    // Both extracted, only the winner went on.
    assert_eq!(h.counts(), [2, 1, 1, 1]);
}

#[tokio::test]
async fn speech_failure_keeps_earlier_outputs() {
    let h = Harness::new();
    h.synthesizer
        .script
        .lock()
        .unwrap()
        .push_back(CapabilityError::Provider("tts backend unavailable".into()));
    h.seed("a1", "a.pdf").await;

    let record = h.driver().run_workflow(&"a1".into()).await.unwrap();

    assert_eq!(record.status, WorkflowStatus::Failed);
    assert_eq!(record.extracted_text.as_deref(), Some("Hello world"));
    assert_eq!(record.summary.as_deref(), Some("Hello world."));
    assert!(record.audio_path.is_none());
    assert_eq!(record.failed_stage, Some(Stage::Synthesize));
    assert_eq!(record.failure_kind, Some(FailureKind::Provider));
    assert!(!record.failure_reason.unwrap_or_default().is_empty());
    assert_eq!(h.counts(), [1, 1, 1, 0]);
}

#[tokio::test]
async fn rate_limited_summary_then_retry() {
    let h = Harness::new();
    h.summarizer
        .fail_next(CapabilityError::Provider("rate limited".into()));
    h.seed("a1", "a.pdf").await;
    let driver = h.driver();

    let failed = driver.run_workflow(&"a1".into()).await.unwrap();
    assert_eq!(failed.status, WorkflowStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("rate limited"));
    assert_eq!(failed.extracted_text.as_deref(), Some("Hello world"));
    assert!(failed.summary.is_none());

    let retried = driver.retry(&"a1".into()).await.unwrap();
    assert_eq!(retried.status, WorkflowStatus::Completed);
    assert!(retried.failure_reason.is_none());
    assert!(retried.failed_stage.is_none());
    // Extraction ran once; summarization twice (failure + retry).
    assert_eq!(h.counts(), [1, 2, 1, 1]);
}

#[tokio::test]
async fn failed_record_is_not_resumed_without_retry() {
    let h = Harness::new();
    h.summarizer
        .fail_next(CapabilityError::Provider("rate limited".into()));
    h.seed("a1", "a.pdf").await;
    let driver = h.driver();

    let first = driver.run_workflow(&"a1".into()).await.unwrap();
    let again = driver.run_workflow(&"a1".into()).await.unwrap();

    assert_eq!(first, again);
    assert_eq!(h.counts(), [1, 1, 0, 0]);
}

#[tokio::test]
async fn empty_extraction_is_an_input_failure() {
    let h = Harness::new();
    h.extractor.script("blank.txt", Ok("   \n".into()));
    h.seed("a1", "blank.txt").await;

    let record = h.driver().run_workflow(&"a1".into()).await.unwrap();

    assert_eq!(record.status, WorkflowStatus::Failed);
    assert_eq!(record.failed_stage, Some(Stage::Extract));
    assert_eq!(record.failure_kind, Some(FailureKind::Input));
    assert_eq!(h.counts(), [1, 0, 0, 0]);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let h = Harness::new();
    let driver = h.driver();

    let err = driver.run_workflow(&"missing".into()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }), "{err}");

    let err = driver.retry(&"missing".into()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }), "{err}");
}

#[tokio::test]
async fn cancellation_stops_before_the_next_stage() {
    let h = Harness::new();
    h.seed("a1", "a.pdf").await;
    let driver = h.driver();
    *h.extractor.cancel_during.lock().unwrap() = Some(driver.cancellation_token());

    let err = driver.run_workflow(&"a1".into()).await.unwrap_err();
    match err {
        WorkflowError::Cancelled { status, .. } => {
            assert_eq!(status, WorkflowStatus::TextExtracted)
        }
        other => panic!("expected cancellation, got {other}"),
    }
    assert_eq!(h.counts(), [1, 0, 0, 0]);

    // A new driver over the same store picks up where the first stopped.
    let resumed = h.driver().run_workflow(&"a1".into()).await.unwrap();
    assert_eq!(resumed.status, WorkflowStatus::Completed);
    assert_eq!(h.counts(), [1, 1, 1, 1]);
}

#[tokio::test]
async fn run_many_isolates_failures() {
    let h = Harness::new();
    h.extractor.script(
        "broken.xyz",
        Err(CapabilityError::Input("unsupported file type".into())),
    );
    let driver = h.driver();
    let good = driver.register("a.pdf").await.unwrap();
    let bad = driver.register("broken.xyz").await.unwrap();

    let results = driver
        .run_many(vec![good.id.clone(), bad.id.clone()], 2)
        .await;

    assert_eq!(results.len(), 2);
    for (id, result) in results {
        let record = result.unwrap();
        if id == good.id {
            assert_eq!(record.status, WorkflowStatus::Completed);
        } else {
            assert_eq!(record.status, WorkflowStatus::Failed);
            assert_eq!(record.failure_reason.as_deref(), Some("unsupported file type"));
        }
    }
}

#[tokio::test]
async fn process_registers_and_runs() {
    let h = Harness::new();
    let driver = h.driver();

    let record = driver.process("notes.txt").await.unwrap();

    assert_eq!(record.status, WorkflowStatus::Completed);
    assert_eq!(record.source_path, "notes.txt");
    assert_eq!(driver.list().await.unwrap().len(), 1);
    assert_eq!(driver.status(&record.id).await.unwrap(), record);
}

#[tokio::test]
async fn register_rejects_empty_source() {
    let h = Harness::new();
    let err = h.driver().register("  ").await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidConfig(_)), "{err}");
}

#[tokio::test]
async fn observer_sees_events_in_order() {
    let h = Harness::new();
    h.summarizer
        .fail_next(CapabilityError::Provider("rate limited".into()));
    h.seed("a1", "a.pdf").await;

    let observer = Arc::new(RecordingObserver::default());
    let config = WorkflowConfig::builder()
        .observer(observer.clone() as Arc<dyn WorkflowObserver>)
        .build()
        .unwrap();
    let driver = h.driver().configure(&config);

    driver.run_workflow(&"a1".into()).await.unwrap();
    assert_eq!(
        observer.take(),
        vec![
            "start:uploaded",
            "begin:extract",
            "done:extract",
            "begin:summarize",
            "failed:summarize:rate limited",
            "finish:failed",
        ]
    );

    driver.retry(&"a1".into()).await.unwrap();
    assert_eq!(
        observer.take(),
        vec![
            "start:text_extracted",
            "begin:summarize",
            "done:summarize",
            "begin:synthesize",
            "done:synthesize",
            "begin:illustrate",
            "done:illustrate",
            "begin:finalize",
            "done:finalize",
            "finish:completed",
        ]
    );
}

#[tokio::test]
async fn conflicted_run_still_reports_finish() {
    let h = Harness::with_extractor(MockExtractor {
        barrier: Some(Arc::new(Barrier::new(2))),
        ..Default::default()
    });
    h.seed("doc1", "a.pdf").await;

    let observer = Arc::new(RecordingObserver::default());
    let config = WorkflowConfig::builder()
        .observer(observer.clone() as Arc<dyn WorkflowObserver>)
        .build()
        .unwrap();
    let driver = h.driver().configure(&config);
    let id: DocumentId = "doc1".into();

    let (a, b) = tokio::join!(driver.run_workflow(&id), driver.run_workflow(&id));
    assert!(a.is_ok() != b.is_ok(), "{a:?} / {b:?}");

    let events = observer.take();
    let finishes: Vec<&String> = events.iter().filter(|e| e.starts_with("finish:")).collect();
    assert_eq!(finishes.len(), 2, "{events:?}");
    assert!(finishes.iter().any(|e| *e == "finish:completed"), "{events:?}");
    // The loser reports the status it lost to, never the stale one it read.
    assert!(!finishes.iter().any(|e| *e == "finish:uploaded"), "{events:?}");
}
