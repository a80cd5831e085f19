//! Dispatch errors

use thiserror::Error;

use um_core::ToolOutcome;
use um_deployment::TransportError;
use um_document::DocumentError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown tool called: {0}")]
    UnknownTool(String),

    #[error("Host IP and Username are required in Settings to connect.")]
    MissingConnectionSettings,

    #[error("Missing required argument '{argument}' for {tool}")]
    MissingArgument {
        tool: &'static str,
        argument: &'static str,
    },

    #[error("Method \"{0}\" not found.")]
    MethodNotFound(String),

    #[error("Method name \"{0}\" already exists.")]
    NameCollision(String),

    #[error("No method is selected in the editor.")]
    NoActiveMethod,

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Deployment failed: {0}")]
    Deployment(TransportError),

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: &'static str, secs: u64 },
}

impl DispatchError {
    /// Failed outcome carrying this error's text
    pub fn to_outcome(&self) -> ToolOutcome {
        ToolOutcome::failure(self.to_string())
    }
}
