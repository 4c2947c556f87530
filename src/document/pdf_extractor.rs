//! PDF text extraction wrapper
//!
//! Walks pages with lopdf so a single broken page does not sink the whole
//! document. When lopdf cannot parse the file at all, pdf-extract gets one
//! whole-document attempt before the upload is rejected.

use lopdf::Document;

use super::{join_pages, DocumentError, ExtractedDocument};

/// Extract the newline-joined text of every readable page.
///
/// A document with no extractable text yields an empty string, not an error.
pub fn extract_text(pdf_bytes: &[u8]) -> Result<String, DocumentError> {
    extract_pages(pdf_bytes).map(|doc| doc.text)
}

/// Extract text and report which pages were skipped
pub fn extract_pages(pdf_bytes: &[u8]) -> Result<ExtractedDocument, DocumentError> {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("lopdf could not parse upload ({}), trying pdf-extract", e);
            return extract_with_pdf_extract(pdf_bytes);
        }
    };

    let pages = doc.get_pages();
    let page_count = pages.len();
    let mut skipped_pages = Vec::new();
    let mut results = Vec::with_capacity(page_count);

    for &page_num in pages.keys() {
        match doc.extract_text(&[page_num]) {
            Ok(text) if !text.trim().is_empty() => results.push(Ok(text)),
            Ok(_) => {
                tracing::debug!("Page {} has no extractable text", page_num);
                skipped_pages.push(page_num);
            }
            Err(e) => {
                tracing::debug!("Page {} failed to extract: {}", page_num, e);
                skipped_pages.push(page_num);
                results.push(Err(e));
            }
        }
    }

    let text = join_pages(results);

    if text.is_empty() && page_count > 0 && doc.is_encrypted() {
        return Err(DocumentError::Encrypted);
    }

    Ok(ExtractedDocument { text, page_count, skipped_pages })
}

/// Fallback extraction using the `pdf-extract` crate.
///
/// pdf-extract does not preserve page boundaries, so the result counts as a
/// single page.
fn extract_with_pdf_extract(pdf_bytes: &[u8]) -> Result<ExtractedDocument, DocumentError> {
    let text = pdf_extract::extract_text_from_mem(pdf_bytes)
        .map_err(|e| DocumentError::Unreadable(e.to_string()))?;

    let text = join_pages([Ok::<_, ()>(text)]);
    let skipped_pages = if text.is_empty() { vec![1] } else { Vec::new() };

    Ok(ExtractedDocument { text, page_count: 1, skipped_pages })
}
