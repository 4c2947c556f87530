//! Contract ingestion: PDF bytes in, plain text out.
//!
//! Text is taken page by page. Pages that fail to extract, or that only hold
//! whitespace, are skipped; the rest are joined with a newline in page order.

pub mod pdf_extractor;

pub use pdf_extractor::{extract_pages, extract_text};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document is encrypted")]
    Encrypted,

    #[error("Could not read PDF: {0}")]
    Unreadable(String),
}

/// Result of walking every page of an uploaded document
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    /// Newline-joined text of the pages that yielded text
    pub text: String,
    pub page_count: usize,
    /// 1-based page numbers that failed or came back blank
    pub skipped_pages: Vec<u32>,
}

impl ExtractedDocument {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Join per-page extraction results, dropping failed and blank pages.
///
/// Trailing whitespace of each page is trimmed before joining.
pub fn join_pages<I, E>(pages: I) -> String
where
    I: IntoIterator<Item = Result<String, E>>,
{
    pages
        .into_iter()
        .filter_map(Result::ok)
        .map(|page| page.trim_end().to_string())
        .filter(|page| !page.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
