//! Tesseract engine: drives the system `tesseract` binary and collects its
//! hOCR output from stdout.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use tokio::process::Command;

use super::{EngineError, OcrEngine};
use crate::models::engine::{
    DocumentFormat, EngineDescriptor, ParamField, ParamKind, ParamSchema,
};
use crate::models::hocr::HocrDocument;

pub struct TesseractEngine {
    descriptor: EngineDescriptor,
    default_language: String,
}

impl TesseractEngine {
    pub const NAME: &'static str = "tesseract";

    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            descriptor: EngineDescriptor::new(
                Self::NAME,
                [
                    DocumentFormat::Png,
                    DocumentFormat::Jpeg,
                    DocumentFormat::Tiff,
                    DocumentFormat::Bmp,
                    DocumentFormat::Webp,
                    DocumentFormat::Pdf,
                ],
                Some(Self::schema()),
            ),
            default_language: default_language.into(),
        }
    }

    /// Page segmentation mode and language, matching the binary's
    /// `--psm` and `-l` flags.
    pub fn schema() -> ParamSchema {
        ParamSchema::new(vec![
            ParamField {
                name: "mode".into(),
                required: false,
                kind: ParamKind::Integer { min: Some(0), max: Some(13) },
            },
            ParamField {
                name: "language".into(),
                required: false,
                kind: ParamKind::String { allowed: None },
            },
        ])
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn process(
        &self,
        document: &Path,
        params: &Map<String, Value>,
    ) -> Result<HocrDocument, EngineError> {
        let language = params
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_language)
            .to_string();

        let mut cmd = Command::new("tesseract");
        cmd.arg(document)
            .arg("stdout")
            .args(["-l", &language])
            .kill_on_drop(true);
        if let Some(mode) = params.get("mode").and_then(Value::as_i64) {
            cmd.args(["--psm", &mode.to_string()]);
        }
        cmd.arg("hocr");

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::Unavailable(
                    "tesseract binary not found (install tesseract-ocr)".to_string(),
                ));
            }
            Err(e) => return Err(EngineError::Io(e)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(HocrDocument::new(
            String::from_utf8_lossy(&output.stdout).to_string(),
        ))
    }

    fn validate_config(&self, params: &Map<String, Value>) -> Result<(), EngineError> {
        // Language codes are passed straight to the binary; keep them to
        // the ISO-639 shape so a caller cannot smuggle in flag-like values.
        if let Some(lang) = params.get("language").and_then(Value::as_str) {
            let well_formed = !lang.is_empty()
                && lang
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c == '_' || c == '+');
            if !well_formed {
                return Err(EngineError::InvalidParameters(format!(
                    "language '{lang}' is not a valid tesseract language code"
                )));
            }
        }
        Ok(())
    }
}
