use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Pixel-space bounding box in hOCR coordinate order (x0 y0 x1 y1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BBox {
    pub fn contains(&self, other: &BBox) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }
}

/// A single recognized word with its confidence on the hOCR 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub bbox: BBox,
    pub confidence: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub bbox: BBox,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub bbox: BBox,
    pub lines: Vec<Line>,
}

/// A structured-text recognition result carried as hOCR markup.
///
/// Engines produce one of these per invocation; multi-page documents are
/// merged into a single `HocrDocument` before leaving the dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HocrDocument {
    html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HocrError {
    #[error("hOCR fragment has no ocr_page element")]
    NoPages,

    #[error("malformed hOCR element: {0}")]
    Malformed(String),
}

fn bbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"bbox (\d+) (\d+) (\d+) (\d+)").expect("valid regex"))
}

fn wconf_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"x_wconf (\d+)").expect("valid regex"))
}

fn parse_bbox(title: &str) -> Option<BBox> {
    let caps = bbox_re().captures(title)?;
    Some(BBox {
        x0: caps[1].parse().ok()?,
        y0: caps[2].parse().ok()?,
        x1: caps[3].parse().ok()?,
        y1: caps[4].parse().ok()?,
    })
}

impl HocrDocument {
    pub fn new(html: String) -> Self {
        Self { html }
    }

    pub fn as_html(&self) -> &str {
        &self.html
    }

    pub fn into_html(self) -> String {
        self.html
    }

    /// Parse the markup into the Page -> Line -> Word hierarchy.
    ///
    /// This is a real parse via `scraper`, not string matching; callers use
    /// it both to validate engine output and to project results for the API.
    pub fn pages(&self) -> Result<Vec<Page>, HocrError> {
        let page_sel = Selector::parse("div.ocr_page").expect("valid selector");
        let line_sel = Selector::parse("span.ocr_line").expect("valid selector");
        let word_sel = Selector::parse("span.ocrx_word").expect("valid selector");

        let doc = Html::parse_document(&self.html);
        let mut pages = Vec::new();

        for page_el in doc.select(&page_sel) {
            let title = page_el.value().attr("title").unwrap_or("");
            let bbox = parse_bbox(title)
                .ok_or_else(|| HocrError::Malformed(format!("page title {title:?}")))?;
            let id = page_el.value().attr("id").unwrap_or("page_1").to_string();

            let mut lines = Vec::new();
            for line_el in page_el.select(&line_sel) {
                let line_title = line_el.value().attr("title").unwrap_or("");
                let line_bbox = parse_bbox(line_title)
                    .ok_or_else(|| HocrError::Malformed(format!("line title {line_title:?}")))?;

                let mut words = Vec::new();
                for word_el in line_el.select(&word_sel) {
                    let word_title = word_el.value().attr("title").unwrap_or("");
                    let word_bbox = parse_bbox(word_title).ok_or_else(|| {
                        HocrError::Malformed(format!("word title {word_title:?}"))
                    })?;
                    let confidence = wconf_re()
                        .captures(word_title)
                        .and_then(|c| c[1].parse::<u8>().ok())
                        .unwrap_or(0)
                        .min(100);
                    words.push(Word {
                        text: word_el.text().collect::<String>().trim().to_string(),
                        bbox: word_bbox,
                        confidence,
                    });
                }
                lines.push(Line {
                    bbox: line_bbox,
                    words,
                });
            }
            pages.push(Page { id, bbox, lines });
        }

        if pages.is_empty() {
            return Err(HocrError::NoPages);
        }
        Ok(pages)
    }

    pub fn page_count(&self) -> usize {
        self.pages().map(|p| p.len()).unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) fn sample_page_html(page_id: &str, words: &[(&str, u8)]) -> String {
    let word_spans: String = words
        .iter()
        .enumerate()
        .map(|(i, (text, conf))| {
            let x0 = 10 + i as u32 * 100;
            format!(
                "<span class='ocrx_word' id='word_{n}' title='bbox {x0} 20 {x1} 40; x_wconf {conf}'>{text}</span>",
                n = i + 1,
                x1 = x0 + 80,
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns='http://www.w3.org/1999/xhtml'><head>\
         <meta name='ocr-system' content='tesseract 5.3.0'/>\
         </head><body>\
         <div class='ocr_page' id='{page_id}' title='bbox 0 0 800 600'>\
         <span class='ocr_line' title='bbox 10 20 790 40'>{word_spans}</span>\
         </div></body></html>"
    )
}
