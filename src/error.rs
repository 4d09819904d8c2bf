//! User-facing error taxonomy and its HTTP mapping.
//!
//! Internal details never cross the API boundary: unexpected failures are
//! logged with their cause and surfaced as a generic message plus a code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("unsupported document format{}", fmt_opt(.0))]
    UnsupportedFormat(Option<String>),

    #[error("document exceeds the {limit_bytes} byte limit")]
    FileTooLarge { limit_bytes: u64 },

    #[error("engine '{engine}' is currently unavailable: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    #[error("recognition timed out after {seconds}s; retry via the asynchronous path")]
    ProcessingTimeout { engine: String, seconds: u64 },

    #[error("recognition failed on engine '{engine}': {reason}")]
    ProcessingFailed { engine: String, reason: String },

    #[error("{0}")]
    NotFound(String),

    #[error("job is not completed (status: {status})")]
    ResultNotReady { status: String },

    #[error("internal error")]
    Internal {
        /// Logged, never serialized into a response.
        detail: String,
    },
}

fn fmt_opt(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

impl ApiError {
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Self::Internal {
            detail: cause.to_string(),
        }
    }

    /// Stable machine-readable code, also persisted on failed job records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameters(_) => "INVALID_PARAMETERS",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::EngineUnavailable { .. } => "ENGINE_UNAVAILABLE",
            Self::ProcessingTimeout { .. } => "PROCESSING_TIMEOUT",
            Self::ProcessingFailed { .. } => "PROCESSING_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ResultNotReady { .. } => "RESULT_NOT_READY",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParameters(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::EngineUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProcessingTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::ProcessingFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ResultNotReady { .. } => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Raw causes are logged, never returned.
            Self::Internal { detail } => {
                tracing::error!(error = %detail, "internal error");
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownEngine(name) => {
                Self::NotFound(format!("unknown engine '{name}'"))
            }
            RegistryError::InvalidParameters(reason) => Self::InvalidParameters(reason),
            other @ RegistryError::InvalidRegistration { .. } => Self::internal(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_the_taxonomy() {
        assert_eq!(
            ApiError::InvalidParameters("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::ProcessingTimeout { engine: "t".into(), seconds: 30 }.status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ApiError::FileTooLarge { limit_bytes: 5 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::NotFound("gone".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err = ApiError::internal(std::io::Error::other("secret disk path"));
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
