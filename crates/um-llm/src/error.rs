//! Completion service errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("API Key is missing. Please set it in Settings.")]
    MissingCredential,

    #[error("Gemini API Error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("{0}")]
    Malformed(String),

    #[error("Failed to send completion request: {0}")]
    Request(String),

    #[error("Completion request timed out after {0}s")]
    Timeout(u64),
}

impl CompletionError {
    pub fn no_content() -> Self {
        Self::Malformed("No content in API response.".to_string())
    }

    pub fn no_text() -> Self {
        Self::Malformed("No text content in API response.".to_string())
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key
        Self::Request(err.without_url().to_string())
    }
}
