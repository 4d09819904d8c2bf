//! Job store integration tests against a live Redis.
//!
//! Run with: cargo test --test store_test -- --ignored
//! Set REDIS_URL to override the default (redis://127.0.0.1:6379).

use chrono::Duration;
use serde_json::Map;

use ocr_gateway::models::engine::DocumentFormat;
use ocr_gateway::models::job::{JobRecord, JobStatus, UploadDescriptor};
use ocr_gateway::services::store::JobStore;

fn store() -> JobStore {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    JobStore::new(&url).expect("Failed to connect to Redis")
}

fn record() -> JobRecord {
    JobRecord::new(
        "tesseract",
        UploadDescriptor {
            file_name: "scan.png".into(),
            format: DocumentFormat::Png,
            size_bytes: 4096,
            stored_path: "/tmp/spool/scan.png".into(),
        },
        Map::new(),
    )
}

#[tokio::test]
#[ignore] // Requires a running Redis instance
async fn record_round_trip_and_missing_reads() {
    let store = store();
    let record = record();

    store.put_record(&record).await.expect("put failed");
    let loaded = store
        .get_record(&record.job_id)
        .await
        .expect("get failed")
        .expect("record not found");
    assert_eq!(loaded.job_id, record.job_id);
    assert_eq!(loaded.status, JobStatus::Pending);
    assert_eq!(loaded.upload.file_name, "scan.png");

    // An id that never existed reads back as None, same as an expired one.
    let missing = store.get_record("nonexistent-job-id").await.expect("get failed");
    assert!(missing.is_none());
}

#[tokio::test]
#[ignore] // Requires a running Redis instance
async fn terminal_state_applies_ttl_to_both_keys() {
    let store = store();
    let mut record = record();

    store.put_record(&record).await.expect("put failed");
    store
        .put_result_location(&record.job_id, "/tmp/results/out.hocr")
        .await
        .expect("put result failed");

    record.mark_processing().unwrap();
    record.mark_completed(1, Duration::seconds(2)).unwrap();
    store.put_record(&record).await.expect("terminal put failed");

    let loaded = store
        .get_record(&record.job_id)
        .await
        .expect("get failed")
        .expect("record gone too early");
    assert_eq!(loaded.status, JobStatus::Completed);
    assert!(store
        .get_result_location(&record.job_id)
        .await
        .expect("get location failed")
        .is_some());

    // Past the retention window both keys are evicted.
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    assert!(store.get_record(&record.job_id).await.expect("get failed").is_none());
    assert!(store
        .get_result_location(&record.job_id)
        .await
        .expect("get location failed")
        .is_none());
}

#[tokio::test]
#[ignore] // Requires a running Redis instance
async fn pending_list_hands_jobs_out_in_submission_order() {
    let store = store();
    let first = record();
    let second = record();

    store.enqueue(&first.job_id).await.expect("enqueue failed");
    store.enqueue(&second.job_id).await.expect("enqueue failed");
    assert!(store.queue_depth().await.expect("depth failed") >= 2);

    let got_first = store.dequeue().await.expect("dequeue failed");
    let got_second = store.dequeue().await.expect("dequeue failed");
    assert_eq!(got_first.as_deref(), Some(first.job_id.as_str()));
    assert_eq!(got_second.as_deref(), Some(second.job_id.as_str()));
}
