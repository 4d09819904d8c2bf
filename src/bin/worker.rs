use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use ocr_gateway::app_state::AppState;
use ocr_gateway::config::AppConfig;
use ocr_gateway::engines;
use ocr_gateway::error::ApiError;
use ocr_gateway::models::hocr::HocrDocument;
use ocr_gateway::models::job::JobRecord;
use ocr_gateway::registry::breaker::CircuitBreaker;
use ocr_gateway::registry::EngineRegistry;
use ocr_gateway::services::{dispatch::Dispatcher, store::JobStore};

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting recognition worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Discover engines
    tracing::info!("Discovering recognition engines");
    let breaker = CircuitBreaker::new(config.breaker());
    let registry = EngineRegistry::discover(
        engines::builtin_registrations(&config),
        config.strict_discovery,
        breaker,
    )
    .expect("Engine discovery failed");
    let registry = Arc::new(registry);

    // Initialize the job store
    tracing::info!("Connecting to Redis job store");
    let store = JobStore::new(&config.redis_url).expect("Failed to initialize job store");

    // Jobs run under the asynchronous deadline, not the tighter sync one.
    let dispatcher = Dispatcher::new(Arc::clone(&registry), config.job_timeout());
    let state = AppState::new(registry, dispatcher, store, config);

    tracing::info!("Worker ready, starting job processing loop");

    // Main processing loop
    loop {
        match process_next_job(&state).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }

        if let Ok(depth) = state.store.queue_depth().await {
            metrics::gauge!("ocr_queue_depth").set(depth as f64);
        }
    }
}

/// Process the next job from the pending list.
/// Returns Ok(true) if a job was processed, Ok(false) if none was available.
async fn process_next_job(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let job_id = match state.store.dequeue().await? {
        Some(id) => id,
        None => return Ok(false),
    };

    // The record can expire out of the store between submission and
    // pickup; that job is simply gone.
    let mut record = match state.store.get_record(&job_id).await? {
        Some(record) => record,
        None => {
            tracing::warn!(job_id = %job_id, "dequeued job has no record, skipping");
            return Ok(true);
        }
    };

    tracing::info!(
        job_id = %record.job_id,
        engine = %record.engine,
        file = %record.upload.file_name,
        "Processing recognition job"
    );

    record.mark_processing()?;
    state.store.put_record(&record).await?;

    let retention = state.config.retention();
    match run_job(state, &record).await {
        Ok((result, pages)) => {
            let results_dir = std::path::Path::new(&state.config.results_dir);
            tokio::fs::create_dir_all(results_dir).await?;
            let result_path = results_dir.join(format!("{}.hocr", record.job_id));
            tokio::fs::write(&result_path, result.as_html()).await?;

            // Location first, so the terminal put_record TTLs both keys.
            state
                .store
                .put_result_location(&record.job_id, &result_path.to_string_lossy())
                .await?;
            record.mark_completed(pages, retention)?;
            state.store.put_record(&record).await?;

            metrics::counter!("ocr_jobs_completed").increment(1);
            tracing::info!(
                job_id = %record.job_id,
                pages = pages,
                "Job completed successfully"
            );
        }
        Err(err) => {
            // The submitter is long gone; the failure lives on the record.
            tracing::error!(job_id = %record.job_id, error = %err, "Job processing failed");
            record.mark_failed(err.code(), err.to_string(), retention)?;
            state.store.put_record(&record).await?;
            metrics::counter!("ocr_jobs_failed").increment(1);
        }
    }

    // The spooled upload is no longer needed in either outcome.
    if let Err(e) = tokio::fs::remove_file(&record.upload.stored_path).await {
        tracing::warn!(
            job_id = %record.job_id,
            path = %record.upload.stored_path,
            error = %e,
            "Failed to remove spooled upload"
        );
    }

    Ok(true)
}

/// Run one job through the dispatch core.
async fn run_job(state: &AppState, record: &JobRecord) -> Result<(HocrDocument, usize), ApiError> {
    let bytes = tokio::fs::read(&record.upload.stored_path)
        .await
        .map_err(ApiError::internal)?;

    let outcome = state
        .dispatcher
        .dispatch(&record.engine, &bytes, record.upload.format, &record.params)
        .await?;

    metrics::histogram!("ocr_processing_seconds", "engine" => record.engine.clone())
        .record(outcome.duration_seconds);

    Ok((outcome.result, outcome.pages))
}
