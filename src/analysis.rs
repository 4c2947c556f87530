//! Contract risk analysis: one fixed-template prompt, one completion call.

use thiserror::Error;

use crate::ai_client::{CompletionError, CompletionService};
use crate::document::ExtractedDocument;
use crate::session::{DocumentInfo, Page, SessionState, TransitionError};
use crate::utils::truncate_chars;

/// Characters of contract text embedded in the analysis prompt
pub const ANALYSIS_CHAR_LIMIT: usize = 10_000;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No extractable text found in document")]
    NoText,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("AI Error: {0}")]
    Completion(#[from] CompletionError),
}

/// Prompt sent for the risk summary
#[derive(Debug, Clone)]
pub struct AnalysisPrompt {
    pub text: String,
    /// Characters of contract text actually embedded
    pub embedded_chars: usize,
    pub truncated: bool,
}

impl AnalysisPrompt {
    pub fn build(contract_text: &str) -> Self {
        let (excerpt, truncated) = truncate_chars(contract_text, ANALYSIS_CHAR_LIMIT);
        let text = format!(
            r#"Act as a casual, friendly legal expert. Explain this contract using LOTS of emojis.
Break it down like I'm 15 years old.

Structure:
- 🛡️ SAFETY SCORE (1 to 10)
- 🚩 RED FLAGS (Sneaky stuff)
- 💡 SUMMARY (What is this actually?)
- ✅ VERDICT (Sign or Run?)

Text Content: {}"#,
            excerpt
        );

        Self {
            text,
            embedded_chars: excerpt.chars().count(),
            truncated,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub chars: usize,
    pub embedded_chars: usize,
    pub truncated: bool,
}

/// Analyze an extracted contract and store the result on the session.
///
/// Only runs from the upload page. On success the contract text, the raw
/// model output and the document info are stored; on any failure the session
/// is left exactly as it was.
pub async fn run_analysis(
    service: &dyn CompletionService,
    session: &mut SessionState,
    file_name: &str,
    document: ExtractedDocument,
) -> Result<AnalysisOutcome, AnalysisError> {
    session.require_page(Page::Upload)?;

    if document.is_empty() {
        tracing::warn!("'{}' has no extractable text ({} pages)", file_name, document.page_count);
        return Err(AnalysisError::NoText);
    }

    let prompt = AnalysisPrompt::build(&document.text);
    let chars = document.text.chars().count();
    if prompt.truncated {
        tracing::warn!(
            "Contract '{}' truncated for analysis: {} of {} characters sent",
            file_name, prompt.embedded_chars, chars
        );
    }

    let result = service.generate(&prompt.text).await?;

    session.contract_text = document.text;
    session.analysis_result = result;
    session.document = Some(DocumentInfo {
        file_name: file_name.to_string(),
        page_count: document.page_count,
        skipped_pages: document.skipped_pages,
        chars,
        truncated: prompt.truncated,
    });

    tracing::info!("Analysis stored for '{}' ({} chars)", file_name, session.analysis_result.chars().count());

    Ok(AnalysisOutcome {
        chars,
        embedded_chars: prompt.embedded_chars,
        truncated: prompt.truncated,
    })
}
