//! Document model errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Method {0} not found")]
    MethodNotFound(u32),

    #[error("Argument {index} not found on method {method}")]
    ArgNotFound { method: u32, index: usize },

    #[error("Failed to render ACL policy: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, DocumentError>;
