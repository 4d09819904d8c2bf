//! Multi-page hOCR merge.
//!
//! Page-by-page engines hand back one single-page fragment per page, each
//! numbered from 1 and wrapped in its own document header. The merge strips
//! every fragment down to its `ocr_page` subtree, renumbers the pages
//! sequentially, and re-wraps them under one header declaring a single
//! recognition-system identity.

use scraper::{Html, Selector};

use crate::models::hocr::{HocrDocument, HocrError};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no fragments to merge")]
    Empty,

    #[error("fragment {0} contains no ocr_page element")]
    FragmentWithoutPage(usize),

    #[error("merged document failed validation: {0}")]
    Invalid(#[from] HocrError),
}

/// Combine per-page fragments, in input order, into one document.
///
/// A single fragment is validated by a real parse and then returned
/// untouched so the common single-page case is never lossily reformatted.
pub fn merge_pages(mut fragments: Vec<HocrDocument>) -> Result<HocrDocument, MergeError> {
    match fragments.len() {
        0 => return Err(MergeError::Empty),
        1 => {
            let fragment = fragments.remove(0);
            fragment.pages()?;
            return Ok(fragment);
        }
        _ => {}
    }

    let page_sel = Selector::parse("div.ocr_page").expect("valid selector");
    let mut body = String::new();

    for (index, fragment) in fragments.iter().enumerate() {
        let doc = Html::parse_document(fragment.as_html());
        let page = doc
            .select(&page_sel)
            .next()
            .ok_or(MergeError::FragmentWithoutPage(index))?;

        // Fragments number their own page from 1, or carry an
        // engine-specific id, or none at all. Rewrite whatever id the
        // parsed element actually has so ids stay unique in the combined
        // document. `ElementRef::html` serializes attributes with double
        // quotes, so the rewrite matches on that form.
        let page_html = page.html();
        let renumbered = match page.value().attr("id") {
            Some(id) => page_html.replacen(
                &format!("id=\"{id}\""),
                &format!("id=\"page_{}\"", index + 1),
                1,
            ),
            None => page_html.replacen("<div", &format!("<div id=\"page_{}\"", index + 1), 1),
        };
        body.push_str(&renumbered);
        body.push('\n');
    }

    let merged = HocrDocument::new(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" \
         \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\"><head>\n\
         <title></title>\n\
         <meta http-equiv=\"Content-Type\" content=\"text/html;charset=utf-8\"/>\n\
         <meta name='ocr-system' content='ocr-gateway'/>\n\
         <meta name='ocr-capabilities' content='ocr_page ocr_line ocrx_word'/>\n\
         </head><body>\n{body}</body></html>"
    ));

    // Real-parse validation before the document reaches a caller.
    let pages = merged.pages()?;
    debug_assert_eq!(pages.len(), fragments.len());
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hocr::sample_page_html;

    #[test]
    fn single_fragment_is_returned_as_is() {
        let html = sample_page_html("page_1", &[("solo", 91)]);
        let merged = merge_pages(vec![HocrDocument::new(html.clone())]).unwrap();
        assert_eq!(merged.as_html(), html);

        let pages = merged.pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lines[0].words[0].text, "solo");
    }

    #[test]
    fn single_malformed_fragment_is_rejected() {
        // The passthrough arm still parses; broken markup never reaches a
        // caller just because the document happens to be one page.
        let result = merge_pages(vec![HocrDocument::new(
            "<html><body><p>not hocr</p></body></html>".to_string(),
        )]);
        assert!(matches!(result, Err(MergeError::Invalid(_))));
    }

    #[test]
    fn renumbering_follows_each_fragment_id() {
        // Plugin engines are not obliged to name their page div `page_1`;
        // one fragment here uses a foreign id and one carries none.
        let anonymous = sample_page_html("page_1", &[("mid", 80)]).replace(" id='page_1'", "");
        let fragments = vec![
            HocrDocument::new(sample_page_html("scan-output", &[("first", 90)])),
            HocrDocument::new(anonymous),
            HocrDocument::new(sample_page_html("page_1", &[("last", 70)])),
        ];

        let merged = merge_pages(fragments).unwrap();
        let pages = merged.pages().unwrap();
        let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["page_1", "page_2", "page_3"]);
    }

    #[test]
    fn merges_in_input_order_with_sequential_ids() {
        // Every fragment numbers its page from 1.
        let fragments = vec![
            HocrDocument::new(sample_page_html("page_1", &[("alpha", 90)])),
            HocrDocument::new(sample_page_html("page_1", &[("beta", 91)])),
            HocrDocument::new(sample_page_html("page_1", &[("gamma", 92)])),
        ];

        let merged = merge_pages(fragments).unwrap();
        let pages = merged.pages().unwrap();
        assert_eq!(pages.len(), 3);

        let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["page_1", "page_2", "page_3"]);

        let first_words: Vec<&str> = pages
            .iter()
            .map(|p| p.lines[0].words[0].text.as_str())
            .collect();
        assert_eq!(first_words, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn merged_document_declares_one_system_identity() {
        let fragments = vec![
            HocrDocument::new(sample_page_html("page_1", &[("a", 90)])),
            HocrDocument::new(sample_page_html("page_1", &[("b", 90)])),
        ];
        let merged = merge_pages(fragments).unwrap();

        let doc = Html::parse_document(merged.as_html());
        let meta_sel = Selector::parse("meta[name='ocr-system']").expect("valid selector");
        let systems: Vec<_> = doc.select(&meta_sel).collect();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].value().attr("content"), Some("ocr-gateway"));
    }

    #[test]
    fn empty_input_and_pageless_fragments_are_errors() {
        assert!(matches!(merge_pages(vec![]), Err(MergeError::Empty)));

        let fragments = vec![
            HocrDocument::new(sample_page_html("page_1", &[("ok", 90)])),
            HocrDocument::new("<html><body><p>not hocr</p></body></html>".to_string()),
        ];
        assert!(matches!(
            merge_pages(fragments),
            Err(MergeError::FragmentWithoutPage(1))
        ));
    }

    #[test]
    fn merge_preserves_word_geometry() {
        let fragments = vec![
            HocrDocument::new(sample_page_html("page_1", &[("kept", 77)])),
            HocrDocument::new(sample_page_html("page_1", &[("also", 66)])),
        ];
        let merged = merge_pages(fragments).unwrap();
        let pages = merged.pages().unwrap();
        let word = &pages[0].lines[0].words[0];
        assert_eq!(word.confidence, 77);
        assert!(pages[0].bbox.contains(&word.bbox));
    }
}
