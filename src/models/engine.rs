use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use strum::{Display, EnumString};

/// Document format tags accepted by recognition engines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Png,
    Jpeg,
    Webp,
    Tiff,
    Bmp,
    Pdf,
}

impl DocumentFormat {
    /// Sniff the format from file content. PDFs are recognized by magic
    /// bytes; raster formats via the `image` crate.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            return Some(Self::Pdf);
        }
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::WebP => Some(Self::Webp),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            image::ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }

    /// File extension used when spooling a document to disk.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Tiff => "tif",
            Self::Bmp => "bmp",
            Self::Pdf => "pdf",
        }
    }
}

/// The type and constraints of one engine parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Integer { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64> },
    String { allowed: Option<Vec<String>> },
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamField {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub kind: ParamKind,
}

/// Structural description of an engine's caller-supplied options.
///
/// Schemas are attached explicitly at registration time; an engine without
/// one takes no parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSchema {
    pub fields: Vec<ParamField>,
}

impl ParamSchema {
    pub fn new(fields: Vec<ParamField>) -> Self {
        Self { fields }
    }

    /// Validate a raw parameter bag against the schema. Rejects unknown
    /// keys, wrong types, out-of-range values, and missing required fields.
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<(), String> {
        for key in raw.keys() {
            if !self.fields.iter().any(|f| &f.name == key) {
                return Err(format!("unknown parameter '{key}'"));
            }
        }
        for field in &self.fields {
            let value = match raw.get(&field.name) {
                Some(v) => v,
                None if field.required => {
                    return Err(format!("missing required parameter '{}'", field.name));
                }
                None => continue,
            };
            check_value(field, value)?;
        }
        Ok(())
    }
}

fn check_value(field: &ParamField, value: &Value) -> Result<(), String> {
    let name = &field.name;
    match &field.kind {
        ParamKind::Integer { min, max } => {
            let n = value
                .as_i64()
                .ok_or_else(|| format!("parameter '{name}' must be an integer"))?;
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                return Err(format!("parameter '{name}' out of range: {n}"));
            }
        }
        ParamKind::Float { min, max } => {
            let n = value
                .as_f64()
                .ok_or_else(|| format!("parameter '{name}' must be a number"))?;
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                return Err(format!("parameter '{name}' out of range: {n}"));
            }
        }
        ParamKind::String { allowed } => {
            let s = value
                .as_str()
                .ok_or_else(|| format!("parameter '{name}' must be a string"))?;
            if let Some(allowed) = allowed {
                if !allowed.iter().any(|a| a == s) {
                    return Err(format!("parameter '{name}' must be one of {allowed:?}"));
                }
            }
        }
        ParamKind::Boolean => {
            if !value.is_boolean() {
                return Err(format!("parameter '{name}' must be a boolean"));
            }
        }
    }
    Ok(())
}

/// Identity and capabilities of one pluggable recognition engine.
///
/// Constructed once at registration and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDescriptor {
    pub name: String,
    pub supported_formats: BTreeSet<DocumentFormat>,
    pub parameter_schema: Option<ParamSchema>,
}

impl EngineDescriptor {
    pub fn new(
        name: impl Into<String>,
        supported_formats: impl IntoIterator<Item = DocumentFormat>,
        parameter_schema: Option<ParamSchema>,
    ) -> Self {
        Self {
            name: name.into(),
            supported_formats: supported_formats.into_iter().collect(),
            parameter_schema,
        }
    }

    pub fn supports(&self, format: DocumentFormat) -> bool {
        self.supported_formats.contains(&format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ParamSchema {
        ParamSchema::new(vec![
            ParamField {
                name: "mode".into(),
                required: false,
                kind: ParamKind::Integer { min: Some(0), max: Some(13) },
            },
            ParamField {
                name: "language".into(),
                required: false,
                kind: ParamKind::String {
                    allowed: Some(vec!["eng".into(), "deu".into()]),
                },
            },
        ])
    }

    fn bag(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn accepts_valid_params() {
        assert!(schema().validate(&bag(json!({"mode": 6, "language": "eng"}))).is_ok());
        assert!(schema().validate(&Map::new()).is_ok());
    }

    #[test]
    fn rejects_unknown_key() {
        let err = schema().validate(&bag(json!({"dpi": 300}))).unwrap_err();
        assert!(err.contains("unknown parameter"));
    }

    #[test]
    fn rejects_out_of_range_integer() {
        assert!(schema().validate(&bag(json!({"mode": 14}))).is_err());
        assert!(schema().validate(&bag(json!({"mode": -1}))).is_err());
    }

    #[test]
    fn rejects_wrong_type_and_disallowed_string() {
        assert!(schema().validate(&bag(json!({"mode": "six"}))).is_err());
        assert!(schema().validate(&bag(json!({"language": "fra"}))).is_err());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let schema = ParamSchema::new(vec![ParamField {
            name: "endpoint".into(),
            required: true,
            kind: ParamKind::String { allowed: None },
        }]);
        assert!(schema.validate(&Map::new()).is_err());
    }

    #[test]
    fn sniffs_pdf_and_png() {
        assert_eq!(DocumentFormat::sniff(b"%PDF-1.7 rest"), Some(DocumentFormat::Pdf));
        let png_magic = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
        assert_eq!(DocumentFormat::sniff(&png_magic), Some(DocumentFormat::Png));
        assert_eq!(DocumentFormat::sniff(b"plain text"), None);
    }
}
