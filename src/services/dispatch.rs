//! Bounded dispatch: run one engine against one document under a hard
//! wall-clock deadline, and release the spooled temporary copy on every
//! exit path.
//!
//! The document is copied into a `TempDir` before the engine sees it;
//! dropping the guard removes the directory whether the run succeeded,
//! timed out, or failed. Deadline expiry drops the in-flight engine future,
//! which kills a spawned recognizer process (`kill_on_drop`) and abandons a
//! remote call. Engines that do CPU-bound work in-process are expected to
//! move it off the request pool themselves (`spawn_blocking`).

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;

use crate::engines::EngineError;
use crate::error::ApiError;
use crate::models::engine::DocumentFormat;
use crate::models::hocr::HocrDocument;
use crate::registry::EngineRegistry;
use crate::services::merge;

/// Rendering resolution for PDF page explosion.
const PDF_RENDER_DPI: &str = "300";

#[derive(Debug)]
pub struct DispatchOutcome {
    pub result: HocrDocument,
    pub pages: usize,
    pub duration_seconds: f64,
}

pub struct Dispatcher {
    registry: Arc<EngineRegistry>,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<EngineRegistry>, deadline: Duration) -> Self {
        Self { registry, deadline }
    }

    /// Run one document through one engine.
    ///
    /// Validation and availability are checked before any engine work and
    /// fail fast without consuming a circuit-breaker failure count; errors
    /// raised by the engine itself always update the breaker.
    pub async fn dispatch(
        &self,
        engine_name: &str,
        document: &[u8],
        format: DocumentFormat,
        params: &Map<String, Value>,
    ) -> Result<DispatchOutcome, ApiError> {
        let descriptor = self.registry.descriptor(engine_name).ok_or_else(|| {
            ApiError::NotFound(format!(
                "unknown engine '{engine_name}'; available engines: {}",
                self.registry.engine_names().join(", ")
            ))
        })?;

        if !descriptor.supports(format) {
            return Err(ApiError::UnsupportedFormat(Some(format!(
                "engine '{engine_name}' does not accept {format} documents"
            ))));
        }

        self.registry.validate_params(engine_name, params)?;

        if !self.registry.is_available(engine_name) {
            return Err(ApiError::EngineUnavailable {
                engine: engine_name.to_string(),
                reason: "circuit open after repeated failures".to_string(),
            });
        }

        // Scoped acquisition: the TempDir guard owns the on-disk copy for
        // the rest of this function, success or not.
        let spool = TempDir::new().map_err(ApiError::internal)?;
        let input_path = spool.path().join(format!("input.{}", format.extension()));
        tokio::fs::write(&input_path, document)
            .await
            .map_err(ApiError::internal)?;

        let page_paths = if format == DocumentFormat::Pdf {
            explode_pdf(&input_path, spool.path()).await?
        } else {
            vec![input_path]
        };

        let engine = self.registry.get_engine(engine_name)?;
        let started = Instant::now();

        let run = async {
            let mut fragments = Vec::with_capacity(page_paths.len());
            for page in &page_paths {
                fragments.push(engine.process(page, params).await?);
            }
            Ok::<_, EngineError>(fragments)
        };

        let fragments = match tokio::time::timeout(self.deadline, run).await {
            Err(_) => {
                self.registry.record_failure(engine_name);
                tracing::warn!(
                    engine = engine_name,
                    deadline_secs = self.deadline.as_secs(),
                    "recognition deadline exceeded"
                );
                return Err(ApiError::ProcessingTimeout {
                    engine: engine_name.to_string(),
                    seconds: self.deadline.as_secs(),
                });
            }
            Ok(Err(err)) => {
                self.registry.record_failure(engine_name);
                tracing::error!(engine = engine_name, error = %err, "engine invocation failed");
                return Err(translate_engine_error(engine_name, err));
            }
            Ok(Ok(fragments)) => fragments,
        };

        let merged = match merge::merge_pages(fragments) {
            Ok(merged) => merged,
            Err(err) => {
                // Unparseable engine output counts against the engine.
                self.registry.record_failure(engine_name);
                tracing::error!(engine = engine_name, error = %err, "engine output failed hOCR validation");
                return Err(ApiError::ProcessingFailed {
                    engine: engine_name.to_string(),
                    reason: "engine produced malformed structured-text output".to_string(),
                });
            }
        };

        self.registry.record_success(engine_name);
        Ok(DispatchOutcome {
            pages: page_paths.len(),
            duration_seconds: started.elapsed().as_secs_f64(),
            result: merged,
        })
    }
}

fn translate_engine_error(engine: &str, err: EngineError) -> ApiError {
    match err {
        EngineError::UnsupportedFormat(detail) => ApiError::UnsupportedFormat(Some(detail)),
        EngineError::InvalidParameters(detail) => ApiError::InvalidParameters(detail),
        EngineError::Unavailable(reason) => ApiError::EngineUnavailable {
            engine: engine.to_string(),
            reason,
        },
        EngineError::Failed(reason) => ApiError::ProcessingFailed {
            engine: engine.to_string(),
            reason,
        },
        EngineError::Io(err) => ApiError::ProcessingFailed {
            engine: engine.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Convert a PDF into one PNG per page inside the spool directory.
async fn explode_pdf(pdf_path: &Path, spool: &Path) -> Result<Vec<PathBuf>, ApiError> {
    let prefix = spool.join("page");
    let status = Command::new("pdftoppm")
        .args(["-png", "-r", PDF_RENDER_DPI])
        .arg(pdf_path)
        .arg(&prefix)
        .kill_on_drop(true)
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            return Err(ApiError::UnsupportedFormat(Some(format!(
                "PDF could not be rasterized (pdftoppm exited with {status})"
            ))));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::UnsupportedFormat(Some(
                "PDF input requires poppler-utils (pdftoppm) on the host".to_string(),
            )));
        }
        Err(e) => return Err(ApiError::internal(e)),
    }

    // pdftoppm zero-pads page numbers, so a lexical sort is page order.
    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(spool).await.map_err(ApiError::internal)?;
    while let Some(entry) = entries.next_entry().await.map_err(ApiError::internal)? {
        let path = entry.path();
        let is_page = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("page-") && n.ends_with(".png"));
        if is_page {
            pages.push(path);
        }
    }
    pages.sort();

    if pages.is_empty() {
        return Err(ApiError::UnsupportedFormat(Some(
            "PDF contains no renderable pages".to_string(),
        )));
    }
    Ok(pages)
}
