//! Session and orchestration errors

use thiserror::Error;
use um_llm::CompletionError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No active chat session")]
    NoActiveSession,

    #[error("Chat session not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("A chat turn is already in progress")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("{0}")]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Stopped after {0} completion rounds without a final answer")]
    RoundLimitExceeded(usize),
}
