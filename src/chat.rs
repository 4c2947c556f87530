//! Follow-up questions answered from the stored contract text.

use thiserror::Error;

use crate::ai_client::{CompletionError, CompletionService};
use crate::session::{Message, Page, Role, SessionState, TransitionError};
use crate::utils::truncate_chars;

/// Characters of contract text embedded in each chat prompt
pub const CHAT_CHAR_LIMIT: usize = 8_000;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("AI Error: {0}")]
    Completion(#[from] CompletionError),
}

#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub text: String,
    pub truncated: bool,
}

impl ChatPrompt {
    pub fn build(contract_text: &str, question: &str) -> Self {
        let (excerpt, truncated) = truncate_chars(contract_text, CHAT_CHAR_LIMIT);
        Self {
            text: format!("Based on this text: {}\nAnswer this: {}", excerpt, question),
            truncated,
        }
    }
}

/// Ask one question about the contract.
///
/// The question is recorded before the call goes out. When the call fails
/// the question stays in the history, no answer is recorded, and the error
/// is returned for inline display.
pub async fn ask(
    service: &dyn CompletionService,
    session: &mut SessionState,
    question: &str,
) -> Result<Message, ChatError> {
    session.require_page(Page::Results)?;

    if question.trim().is_empty() {
        return Err(ChatError::EmptyQuestion);
    }

    session.push_message(Role::User, question);

    let prompt = ChatPrompt::build(&session.contract_text, question);
    if prompt.truncated {
        tracing::debug!("Chat context truncated to {} characters", CHAT_CHAR_LIMIT);
    }

    let answer = match service.generate(&prompt.text).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!("Chat completion failed: {}", e);
            return Err(e.into());
        }
    };

    Ok(session.push_message(Role::Assistant, answer).clone())
}
