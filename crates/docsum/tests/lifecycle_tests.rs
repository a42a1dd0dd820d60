//! Upload → generate → done/error flows through the launched service.

mod common;

use std::sync::Arc;

use common::{FlakySummarizer, GateSummarizer, TestHarness};
use docsum::config::WorkerConfig;
use docsum::{DocsumError, DocumentStatus, ErrorKind, UploadedFile};

const REPORT: &str = "Quarterly revenue grew by ten percent. Costs stayed flat. \
                      The board approved the expansion plan.";

#[tokio::test]
async fn test_upload_generate_done() {
    let harness = TestHarness::new();
    let record = harness.upload_text(REPORT).await;
    assert_eq!(record.status, DocumentStatus::Uploaded);
    assert!(record.result.is_none());

    let status = harness
        .service
        .generate(&record.document_id, None)
        .await
        .unwrap();
    assert_eq!(status, DocumentStatus::Processing);

    let done = harness
        .wait_for_status(&record.document_id, DocumentStatus::Done)
        .await;
    let summary = done.result.expect("done without result");
    assert!(summary.starts_with("Quarterly revenue grew"));
    assert_eq!(done.text, record.text);
    assert!(done.updated_at >= record.updated_at);

    // done is terminal
    let err = harness
        .service
        .generate(&record.document_id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DocsumError::InvalidTransition {
            current: DocumentStatus::Done,
            ..
        }
    ));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let summarizer = Arc::new(FlakySummarizer::new(1));
    let harness = TestHarness::with_summarizer(
        summarizer.clone(),
        WorkerConfig {
            worker_count: 1,
            queue_capacity: 4,
            max_attempts: 2,
        },
    );

    let record = harness.upload_text(REPORT).await;
    harness
        .service
        .generate(&record.document_id, None)
        .await
        .unwrap();

    let done = harness
        .wait_for_status(&record.document_id, DocumentStatus::Done)
        .await;
    assert_eq!(done.result.as_deref(), Some("Recovered summary"));
    assert_eq!(summarizer.calls(), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_exhausted_retries_mark_error() {
    let harness = TestHarness::with_summarizer(
        Arc::new(FlakySummarizer::new(u32::MAX)),
        WorkerConfig {
            worker_count: 1,
            queue_capacity: 4,
            max_attempts: 2,
        },
    );

    let record = harness.upload_text(REPORT).await;
    harness
        .service
        .generate(&record.document_id, None)
        .await
        .unwrap();

    let failed = harness
        .wait_for_status(&record.document_id, DocumentStatus::Error)
        .await;
    assert!(failed.result.is_none());
    assert!(failed
        .error
        .as_deref()
        .is_some_and(|e| e.contains("transient failure 2")));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_queue_full_rolls_back_to_uploaded() {
    let (gate, started, release) = GateSummarizer::new();
    let harness = TestHarness::with_summarizer(
        Arc::new(gate),
        WorkerConfig {
            worker_count: 1,
            queue_capacity: 1,
            max_attempts: 1,
        },
    );

    let running = harness.upload_text("First document.").await;
    let queued = harness.upload_text("Second document.").await;
    let rejected = harness.upload_text("Third document.").await;

    harness
        .service
        .generate(&running.document_id, None)
        .await
        .unwrap();
    tokio::task::spawn_blocking(move || started.recv())
        .await
        .unwrap()
        .unwrap();
    harness
        .service
        .generate(&queued.document_id, None)
        .await
        .unwrap();

    let err = harness
        .service
        .generate(&rejected.document_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DocsumError::QueueFull));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(
        harness.service.get(&rejected.document_id).await.unwrap().status,
        DocumentStatus::Uploaded
    );

    release.send(()).unwrap();
    release.send(()).unwrap();
    harness
        .wait_for_status(&running.document_id, DocumentStatus::Done)
        .await;
    harness
        .wait_for_status(&queued.document_id, DocumentStatus::Done)
        .await;

    // the rolled-back document can be generated once there is room
    release.send(()).unwrap();
    harness
        .service
        .generate(&rejected.document_id, None)
        .await
        .unwrap();
    harness
        .wait_for_status(&rejected.document_id, DocumentStatus::Done)
        .await;

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generate_has_single_winner() {
    let harness = TestHarness::new();
    let record = harness.upload_text(REPORT).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&harness.service);
        let id = record.document_id.clone();
        handles.push(tokio::spawn(async move { service.generate(&id, None).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(status) => {
                assert_eq!(status, DocumentStatus::Processing);
                winners += 1;
            }
            Err(e) => assert_eq!(e.kind(), ErrorKind::Validation),
        }
    }
    assert_eq!(winners, 1);

    harness
        .wait_for_status(&record.document_id, DocumentStatus::Done)
        .await;
    harness.shutdown().await;
}

#[tokio::test]
async fn test_regenerate_keeps_stored_result() {
    let harness = TestHarness::new();
    let record = harness.upload_text(REPORT).await;
    harness
        .service
        .generate(&record.document_id, None)
        .await
        .unwrap();
    let done = harness
        .wait_for_status(&record.document_id, DocumentStatus::Done)
        .await;

    let options = docsum::SummaryOptions {
        max_new_tokens: 6,
        style: None,
    };
    let fresh = harness
        .service
        .regenerate(&record.document_id, Some(options))
        .await
        .unwrap();
    assert_eq!(fresh, "Quarterly revenue grew by ten percent.");

    let after = harness.service.get(&record.document_id).await.unwrap();
    assert_eq!(after.result, done.result);
    assert_eq!(after.updated_at, done.updated_at);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_listing_reflects_statuses() {
    let harness = TestHarness::new();
    let first = harness.upload_text("Alpha report.").await;
    let second = harness.upload_text("Beta report.").await;
    harness
        .service
        .generate(&first.document_id, None)
        .await
        .unwrap();
    harness
        .wait_for_status(&first.document_id, DocumentStatus::Done)
        .await;

    let listed = harness.service.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    let status_of = |id: &str| listed.iter().find(|d| d.document_id == id).unwrap().status;
    assert_eq!(status_of(&first.document_id), DocumentStatus::Done);
    assert_eq!(status_of(&second.document_id), DocumentStatus::Uploaded);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_rejected_uploads_store_nothing() {
    let harness = TestHarness::new();

    let oversized = UploadedFile::new(
        "big.txt",
        "text/plain",
        vec![b'a'; common::harness::UPLOAD_LIMIT as usize + 1],
    );
    let err = harness.service.upload(oversized).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);

    let empty = UploadedFile::new("blank.txt", "text/plain", b"   \n".to_vec());
    let err = harness.service.upload(empty).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let broken_pdf = UploadedFile::new("x.pdf", "application/pdf", b"%PDF-garbage".to_vec());
    let err = harness.service.upload(broken_pdf).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(harness.store.is_empty());
    harness.shutdown().await;
}
