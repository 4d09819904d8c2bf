use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::read_submission;
use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::job::{JobRecord, JobStatus, UploadDescriptor};

#[derive(Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub engine: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub page_count: Option<usize>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            engine: record.engine,
            file_name: record.upload.file_name,
            created_at: record.created_at,
            start_time: record.start_time,
            completion_time: record.completion_time,
            expiration_time: record.expiration_time,
            page_count: record.page_count,
            error_code: record.error_code,
            error_message: record.error_message,
        }
    }
}

/// POST /api/v1/jobs — submit a document for asynchronous recognition.
///
/// Parameter and format validation happen here, before a record is
/// created; a job that makes it into the store is dispatchable as-is.
pub async fn submit_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let submission = read_submission(multipart, state.config.async_limit_bytes).await?;

    let descriptor = state.registry.descriptor(&submission.engine).ok_or_else(|| {
        ApiError::NotFound(format!(
            "unknown engine '{}'; available engines: {}",
            submission.engine,
            state.registry.engine_names().join(", ")
        ))
    })?;
    if !descriptor.supports(submission.format) {
        return Err(ApiError::UnsupportedFormat(Some(format!(
            "engine '{}' does not accept {} documents",
            submission.engine, submission.format
        ))));
    }
    state
        .registry
        .validate_params(&submission.engine, &submission.params)?;

    let mut record = JobRecord::new(
        submission.engine,
        UploadDescriptor {
            file_name: submission.file_name,
            format: submission.format,
            size_bytes: submission.bytes.len() as u64,
            stored_path: String::new(),
        },
        submission.params,
    );

    let spool_dir = std::path::Path::new(&state.config.spool_dir);
    tokio::fs::create_dir_all(spool_dir)
        .await
        .map_err(ApiError::internal)?;
    let stored_path = spool_dir.join(format!(
        "{}.{}",
        record.job_id,
        submission.format.extension()
    ));
    tokio::fs::write(&stored_path, &submission.bytes)
        .await
        .map_err(ApiError::internal)?;
    record.upload.stored_path = stored_path.to_string_lossy().into_owned();

    state
        .store
        .put_record(&record)
        .await
        .map_err(ApiError::internal)?;
    state
        .store
        .enqueue(&record.job_id)
        .await
        .map_err(ApiError::internal)?;

    metrics::counter!("ocr_jobs_total").increment(1);
    tracing::info!(job_id = %record.job_id, engine = %record.engine, "job submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: record.job_id,
            status: record.status,
        }),
    ))
}

/// GET /api/v1/jobs/{job_id} — current job record projection.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let record = state
        .store
        .get_record(&job_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotFound(format!("unknown or expired job '{job_id}'")))?;
    Ok(Json(record.into()))
}

/// GET /api/v1/jobs/{job_id}/result — the merged hOCR document, available
/// only once the job has completed.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state
        .store
        .get_record(&job_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotFound(format!("unknown or expired job '{job_id}'")))?;

    if record.status != JobStatus::Completed {
        return Err(ApiError::ResultNotReady {
            status: format!("{:?}", record.status).to_lowercase(),
        });
    }

    let location = state
        .store
        .get_result_location(&job_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotFound(format!("result for job '{job_id}' has expired")))?;

    let hocr = tokio::fs::read_to_string(&location)
        .await
        .map_err(ApiError::internal)?;

    Ok((
        [(header::CONTENT_TYPE, "application/xhtml+xml; charset=utf-8")],
        hocr,
    )
        .into_response())
}
