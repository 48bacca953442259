//! Streaming CSV import through the coordinator.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use catalog_core::config::{EngineConfig, ExecutionMode};
use catalog_core::error::{CoreError, StoreError};
use catalog_core::job::{JobListQuery, JobPhase, JobStatus};
use catalog_pipeline::ImportSource;
use common::{engine, products_csv, test_config, wait_for_terminal};

// ---------------------------------------------------------------------------
// Batching and counters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn twelve_thousand_rows_commit_in_three_batches() {
    let engine = engine(test_config());
    let source = ImportSource::text("big.csv", products_csv(12_000));

    let job_id = engine
        .coordinator
        .submit_import(source, Some(5_000))
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.processed, 12_000);
    assert_eq!(job.total, Some(12_000));
    assert_eq!(job.error_count, 0);
    assert_eq!(engine.catalog.len(), 12_000);

    // One event per committed batch, then the terminal one. Claiming the
    // job and counting the source publish nothing.
    assert_eq!(
        engine.bus.trace_for(job_id),
        vec![
            (JobStatus::Running, 5_000),
            (JobStatus::Running, 10_000),
            (JobStatus::Running, 12_000),
            (JobStatus::Succeeded, 12_000),
        ]
    );

    let events = engine.bus.events_for(job_id);
    assert!(events.iter().all(|e| e.total == Some(12_000)));
    let last = events.last().unwrap();
    assert_eq!(last.percent, 100);
    assert_eq!(last.phase, JobPhase::Finished);
}

#[tokio::test]
async fn processed_equals_row_count_for_any_batch_size() {
    for batch_size in [1, 7, 100, 250, 1_000] {
        let engine = engine(test_config());
        let source = ImportSource::text("p.csv", products_csv(250));

        let job_id = engine
            .coordinator
            .submit_import(source, Some(batch_size))
            .await
            .unwrap();
        let job = wait_for_terminal(&engine.coordinator, job_id).await;

        assert_eq!(job.status, JobStatus::Succeeded, "batch size {batch_size}");
        assert_eq!(job.processed, 250, "batch size {batch_size}");
        assert_eq!(job.total, Some(250), "batch size {batch_size}");
        assert_eq!(
            engine.bus.batch_events_for(job_id).len(),
            250_usize.div_ceil(batch_size),
            "batch size {batch_size}"
        );
    }
}

#[tokio::test]
async fn default_batch_size_comes_from_config() {
    let config = EngineConfig {
        import_batch_size: 40,
        ..test_config()
    };
    let engine = engine(config);

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", products_csv(100)), None)
        .await
        .unwrap();
    wait_for_terminal(&engine.coordinator, job_id).await;

    let batches: Vec<i64> = engine
        .bus
        .batch_events_for(job_id)
        .iter()
        .map(|e| e.processed)
        .collect();
    assert_eq!(batches, vec![40, 80, 100]);
}

#[tokio::test]
async fn reimporting_the_same_source_is_idempotent() {
    let engine = engine(test_config());
    let csv = products_csv(300);

    let first = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", csv.clone()), Some(64))
        .await
        .unwrap();
    wait_for_terminal(&engine.coordinator, first).await;
    let after_one = engine.catalog.snapshot();
    let changes_after_one = engine.catalog.changed_rows();

    let second = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", csv), Some(64))
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, second).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.processed, 300);
    assert_eq!(engine.catalog.snapshot(), after_one);
    assert_eq!(engine.catalog.changed_rows(), changes_after_one);
}

#[tokio::test]
async fn duplicate_skus_resolve_to_the_last_row() {
    let engine = engine(test_config());
    let csv = "sku,name,price\nab-1,First,1\nAB-1,Second,2\nzz,Other,3\n";

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("dupes.csv", csv), None)
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.processed, 3);
    assert_eq!(engine.catalog.len(), 2);
    let product = engine.catalog.get("ab-1").unwrap();
    assert_eq!(product.name, "Second");
    assert_eq!(product.price_cents, 200);
}

// ---------------------------------------------------------------------------
// Row errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn row_errors_are_tallied_and_the_import_succeeds() {
    let engine = engine(test_config());
    let csv = "sku,name,price\nA,ok,1\n,no sku,2\nB,bad price,abc\nC,ok,3\n";

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("errors.csv", csv), Some(2))
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.processed, 4);
    assert_eq!(job.error_count, 2);
    assert_eq!(job.row_errors.len(), 2);
    assert_eq!(job.row_errors[0].row, 3);
    assert_eq!(job.row_errors[0].message, "SKU is required.");
    assert_eq!(job.row_errors[1].row, 4);
    assert_eq!(job.row_errors[1].message, "Invalid price value 'abc'.");
    assert_eq!(engine.catalog.len(), 2);
}

#[tokio::test]
async fn row_error_details_are_capped() {
    let config = EngineConfig {
        max_error_records: 3,
        ..test_config()
    };
    let engine = engine(config);
    let mut csv = String::from("sku,price\n");
    for _ in 0..10 {
        csv.push_str(",1\n");
    }

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("blank.csv", csv), None)
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.error_count, 10);
    assert_eq!(job.row_errors.len(), 3);
    assert!(engine.catalog.is_empty());
}

// ---------------------------------------------------------------------------
// Source failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_file_fails_the_job() {
    let engine = engine(test_config());

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::file("/nonexistent/products.csv"), None)
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error.as_deref(),
        Some("CSV file not found at /nonexistent/products.csv")
    );
    assert_eq!(job.source.as_deref(), Some("products.csv"));
}

#[tokio::test]
async fn source_without_header_fails_the_job() {
    let engine = engine(test_config());

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("empty.csv", ""), None)
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error.as_deref(),
        Some("CSV source must include a header row")
    );
}

#[tokio::test]
async fn header_only_source_succeeds_with_nothing_processed() {
    let engine = engine(test_config());

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("header.csv", "sku,name\n"), None)
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.processed, 0);
    assert_eq!(job.total, Some(0));
    assert_eq!(job.percent(), 100);
    assert_eq!(
        engine.bus.trace_for(job_id),
        vec![(JobStatus::Succeeded, 0)]
    );
}

#[tokio::test]
async fn file_sources_are_streamed_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.csv");
    std::fs::write(&path, products_csv(25)).unwrap();
    let engine = engine(test_config());

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::file(path.clone()), Some(10))
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.processed, 25);
    assert_eq!(job.source.as_deref(), Some("catalog.csv"));
    assert_eq!(engine.catalog.len(), 25);
}

// ---------------------------------------------------------------------------
// Retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let engine = engine(test_config());
    engine
        .catalog
        .fail_next_upserts(2, StoreError::Unavailable("connection reset".into()));

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", products_csv(20)), Some(10))
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.processed, 20);
    assert_eq!(engine.catalog.len(), 20);
}

#[tokio::test]
async fn exhausted_retries_fail_the_job_with_the_last_error() {
    let engine = engine(test_config());
    engine
        .catalog
        .fail_next_upserts(3, StoreError::Unavailable("connection reset".into()));

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", products_csv(20)), Some(10))
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.processed, 0);
    assert_eq!(
        job.error.as_deref(),
        Some("Store unavailable: connection reset")
    );
    assert!(engine.catalog.is_empty());

    let last = engine.bus.events_for(job_id).pop().unwrap();
    assert_eq!(last.status, JobStatus::Failed);
}

#[tokio::test]
async fn slow_batches_time_out() {
    let config = EngineConfig {
        batch_timeout: Duration::from_millis(20),
        batch_max_attempts: 2,
        ..test_config()
    };
    let engine = engine(config);
    engine.catalog.set_delay(Duration::from_millis(200));

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", products_csv(5)), None)
        .await
        .unwrap();
    let job = wait_for_terminal(&engine.coordinator, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("timed out"));
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inline_mode_returns_a_finished_job() {
    let config = EngineConfig {
        import_execution: ExecutionMode::Inline,
        ..test_config()
    };
    let engine = engine(config);

    let job_id = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", products_csv(30)), Some(10))
        .await
        .unwrap();
    let job = engine.coordinator.get_status(job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.processed, 30);
}

#[tokio::test]
async fn dropping_an_inline_submission_does_not_strand_the_job() {
    let config = EngineConfig {
        import_execution: ExecutionMode::Inline,
        ..test_config()
    };
    let engine = engine(config);
    engine.catalog.set_delay(Duration::from_millis(30));

    let submit = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", products_csv(50)), Some(10));
    let abandoned = tokio::time::timeout(Duration::from_millis(50), submit).await;
    assert!(abandoned.is_err(), "import should still be running");

    let started = engine
        .coordinator
        .list_jobs(&JobListQuery::default())
        .await
        .unwrap()
        .remove(0);
    let job = wait_for_terminal(&engine.coordinator, started.id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.processed, 50);
    assert_eq!(engine.catalog.len(), 50);
}

#[tokio::test]
async fn zero_batch_size_is_rejected_without_a_job() {
    let engine = engine(test_config());

    let result = engine
        .coordinator
        .submit_import(ImportSource::text("p.csv", products_csv(3)), Some(0))
        .await;

    assert_matches!(result, Err(CoreError::Validation(_)));
    assert!(engine.jobs.is_empty());
}
