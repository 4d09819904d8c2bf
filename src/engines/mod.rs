//! Recognition engine plugin contract and built-in engines.
//!
//! Engines are external collaborators behind one trait: a command-line OCR
//! binary, a remote neural-network recognizer, and whatever else a
//! deployment wires in. The registry only ever sees `OcrEngine` objects
//! plus their descriptors; registration is an explicit list supplied by the
//! composition root, never reflection.

mod neural;
mod tesseract;

pub use neural::NeuralEngine;
pub use tesseract::TesseractEngine;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::engine::EngineDescriptor;
use crate::models::hocr::HocrDocument;
use crate::registry::EngineRegistration;

/// Error raised by an engine's `process` call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("recognition failed: {0}")]
    Failed(String),

    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contract every pluggable recognition engine implements.
///
/// `process` must be safe to call repeatedly and concurrently with no
/// required ordering between invocations.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn descriptor(&self) -> &EngineDescriptor;

    /// Run recognition over one document (a single raster page for
    /// page-by-page engines) and return structured text.
    async fn process(
        &self,
        document: &Path,
        params: &Map<String, Value>,
    ) -> Result<HocrDocument, EngineError>;

    /// Engine-specific semantic validation beyond the structural schema.
    fn validate_config(&self, _params: &Map<String, Value>) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Registration list for the engines shipped with this service, wired at
/// process start. Factories run lazily on first use.
pub fn builtin_registrations(config: &AppConfig) -> Vec<EngineRegistration> {
    let language = config.tesseract_language.clone();
    let tesseract = EngineRegistration::new(
        TesseractEngine::new(language.as_str()).descriptor().clone(),
        move || Arc::new(TesseractEngine::new(language.as_str())) as Arc<dyn OcrEngine>,
    );

    let endpoint = config.neural_endpoint.clone();
    let token = config.neural_api_token.clone();
    let neural = EngineRegistration::new(
        NeuralEngine::new(endpoint.clone(), token.clone()).descriptor().clone(),
        move || Arc::new(NeuralEngine::new(endpoint.clone(), token.clone())) as Arc<dyn OcrEngine>,
    );

    vec![tesseract, neural]
}
