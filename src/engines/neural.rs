//! Neural-network recognition engine behind an HTTP inference endpoint.
//!
//! The service accepts a base64 image and answers with line/word geometry
//! and confidences; the response is rendered into hOCR so downstream code
//! sees the same structured-text shape as every other engine.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::path::Path;

use super::{EngineError, OcrEngine};
use crate::models::engine::{
    DocumentFormat, EngineDescriptor, ParamField, ParamKind, ParamSchema,
};
use crate::models::hocr::HocrDocument;

pub struct NeuralEngine {
    descriptor: EngineDescriptor,
    http: Client,
    endpoint: Option<String>,
    api_token: Option<String>,
}

#[derive(Deserialize)]
struct InferenceResponse {
    width: u32,
    height: u32,
    lines: Vec<InferenceLine>,
}

#[derive(Deserialize)]
struct InferenceLine {
    bbox: [u32; 4],
    words: Vec<InferenceWord>,
}

#[derive(Deserialize)]
struct InferenceWord {
    text: String,
    bbox: [u32; 4],
    /// Confidence on a 0.0-1.0 scale.
    confidence: f64,
}

impl NeuralEngine {
    pub const NAME: &'static str = "neural";

    pub fn new(endpoint: Option<String>, api_token: Option<String>) -> Self {
        Self {
            descriptor: EngineDescriptor::new(
                Self::NAME,
                [DocumentFormat::Png, DocumentFormat::Jpeg, DocumentFormat::Webp],
                Some(Self::schema()),
            ),
            http: Client::new(),
            endpoint,
            api_token,
        }
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new(vec![ParamField {
            name: "min_confidence".into(),
            required: false,
            kind: ParamKind::Float { min: Some(0.0), max: Some(100.0) },
        }])
    }
}

#[async_trait]
impl OcrEngine for NeuralEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn process(
        &self,
        document: &Path,
        params: &Map<String, Value>,
    ) -> Result<HocrDocument, EngineError> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            EngineError::Unavailable("no neural inference endpoint configured".to_string())
        })?;

        let image_bytes = tokio::fs::read(document).await?;
        let min_confidence = params
            .get("min_confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(&image_bytes),
            "min_confidence": min_confidence,
        });

        let mut request = self.http.post(endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Failed(format!("inference request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(EngineError::Failed(format!(
                "inference endpoint returned {}",
                response.status()
            )));
        }

        let inference: InferenceResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Failed(format!("malformed inference response: {e}")))?;

        Ok(render_hocr(&inference))
    }
}

/// Render an inference response as a single-page hOCR document.
fn render_hocr(inference: &InferenceResponse) -> HocrDocument {
    let mut body = String::new();
    let _ = write!(
        body,
        "<div class='ocr_page' id='page_1' title='bbox 0 0 {} {}; ppageno 0'>",
        inference.width, inference.height
    );
    for (li, line) in inference.lines.iter().enumerate() {
        let [x0, y0, x1, y1] = line.bbox;
        let _ = write!(
            body,
            "<span class='ocr_line' id='line_1_{}' title='bbox {x0} {y0} {x1} {y1}'>",
            li + 1
        );
        for (wi, word) in line.words.iter().enumerate() {
            let [wx0, wy0, wx1, wy1] = word.bbox;
            let conf = (word.confidence * 100.0).round().clamp(0.0, 100.0) as u8;
            let _ = write!(
                body,
                "<span class='ocrx_word' id='word_1_{}_{}' \
                 title='bbox {wx0} {wy0} {wx1} {wy1}; x_wconf {conf}'>{}</span> ",
                li + 1,
                wi + 1,
                escape(&word.text)
            );
        }
        body.push_str("</span>");
    }
    body.push_str("</div>");

    HocrDocument::new(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" \
         \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\"><head>\n\
         <title></title>\n\
         <meta http-equiv=\"Content-Type\" content=\"text/html;charset=utf-8\"/>\n\
         <meta name='ocr-system' content='{}'/>\n\
         <meta name='ocr-capabilities' content='ocr_page ocr_line ocrx_word'/>\n\
         </head><body>\n{body}\n</body></html>",
        NeuralEngine::NAME
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_parseable_hocr_with_confidences() {
        let inference = InferenceResponse {
            width: 640,
            height: 480,
            lines: vec![InferenceLine {
                bbox: [10, 10, 630, 40],
                words: vec![
                    InferenceWord {
                        text: "invoice".into(),
                        bbox: [10, 10, 200, 40],
                        confidence: 0.97,
                    },
                    InferenceWord {
                        text: "<total>".into(),
                        bbox: [210, 10, 400, 40],
                        confidence: 0.42,
                    },
                ],
            }],
        };

        let doc = render_hocr(&inference);
        let pages = doc.pages().unwrap();
        assert_eq!(pages.len(), 1);
        let words = &pages[0].lines[0].words;
        assert_eq!(words[0].text, "invoice");
        assert_eq!(words[0].confidence, 97);
        assert_eq!(words[1].text, "<total>");
        assert_eq!(words[1].confidence, 42);
    }

    #[tokio::test]
    async fn unconfigured_endpoint_reports_unavailable() {
        let engine = NeuralEngine::new(None, None);
        let err = engine
            .process(Path::new("/nonexistent.png"), &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }
}
