pub mod engines;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod process;

use axum::extract::Multipart;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::models::engine::DocumentFormat;

/// One document submission, shared by the sync and async endpoints.
///
/// Multipart fields: `document` (the file), `engine` (target engine name),
/// and optionally `params` (a JSON object passed through schema validation).
pub(crate) struct Submission {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
    pub engine: String,
    pub params: Map<String, Value>,
}

pub(crate) async fn read_submission(
    mut multipart: Multipart,
    size_limit: u64,
) -> Result<Submission, ApiError> {
    let mut file_name = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut engine = None;
    let mut params = Map::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidParameters(format!("malformed multipart request: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("document") => {
                file_name = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    ApiError::InvalidParameters(format!("failed to read document field: {e}"))
                })?;
                bytes = Some(data.to_vec());
            }
            Some("engine") => {
                engine = Some(field.text().await.map_err(|e| {
                    ApiError::InvalidParameters(format!("failed to read engine field: {e}"))
                })?);
            }
            Some("params") => {
                let text = field.text().await.map_err(|e| {
                    ApiError::InvalidParameters(format!("failed to read params field: {e}"))
                })?;
                let value: Value = serde_json::from_str(&text).map_err(|e| {
                    ApiError::InvalidParameters(format!("params is not valid JSON: {e}"))
                })?;
                params = match value {
                    Value::Object(map) => map,
                    _ => {
                        return Err(ApiError::InvalidParameters(
                            "params must be a JSON object".to_string(),
                        ));
                    }
                };
            }
            _ => {}
        }
    }

    let bytes =
        bytes.ok_or_else(|| ApiError::InvalidParameters("missing document field".to_string()))?;
    let engine =
        engine.ok_or_else(|| ApiError::InvalidParameters("missing engine field".to_string()))?;

    if bytes.len() as u64 > size_limit {
        return Err(ApiError::FileTooLarge {
            limit_bytes: size_limit,
        });
    }

    let format = DocumentFormat::sniff(&bytes).ok_or(ApiError::UnsupportedFormat(None))?;

    Ok(Submission {
        file_name: file_name.unwrap_or_else(|| "document".to_string()),
        bytes,
        format,
        engine,
        params,
    })
}
