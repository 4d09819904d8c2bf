use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use super::read_submission;
use crate::app_state::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct ProcessResponse {
    pub engine: String,
    pub pages: usize,
    pub processing_duration_seconds: f64,
    /// The merged hOCR document.
    pub hocr: String,
}

/// POST /api/v1/process — recognize a document within the request, under
/// the synchronous deadline.
pub async fn process_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let submission = read_submission(multipart, state.config.sync_limit_bytes).await?;

    tracing::info!(
        engine = %submission.engine,
        format = %submission.format,
        size_bytes = submission.bytes.len(),
        "synchronous recognition request"
    );

    let outcome = state
        .dispatcher
        .dispatch(
            &submission.engine,
            &submission.bytes,
            submission.format,
            &submission.params,
        )
        .await;

    match outcome {
        Ok(outcome) => {
            metrics::histogram!("ocr_processing_seconds", "engine" => submission.engine.clone())
                .record(outcome.duration_seconds);
            metrics::counter!("ocr_sync_requests_total", "outcome" => "success").increment(1);
            Ok(Json(ProcessResponse {
                engine: submission.engine,
                pages: outcome.pages,
                processing_duration_seconds: outcome.duration_seconds,
                hocr: outcome.result.into_html(),
            }))
        }
        Err(err) => {
            metrics::counter!("ocr_sync_requests_total", "outcome" => "error").increment(1);
            Err(err)
        }
    }
}
