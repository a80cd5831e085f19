//! Completion service trait and request/response types
//!
//! A completion service takes the full message log plus an optional tool
//! schema and answers with optional text and at most one function call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use um_core::{ChatMessage, FunctionCall, ToolDefinition};

use crate::error::CompletionError;

/// One completion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Ordered history, including the newest user message if there is one
    pub history: Vec<ChatMessage>,
    /// `None` disables tool use for this call
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Overrides the service's configured system message
    #[serde(default)]
    pub system_message: Option<String>,
}

impl CompletionRequest {
    pub fn new(history: Vec<ChatMessage>) -> Self {
        Self {
            history,
            tools: None,
            system_message: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }
}

/// Text and/or a single function call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_call: None,
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            text: None,
            function_call: Some(call),
        }
    }
}

/// Completion service collaborator
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Service name for logs
    fn name(&self) -> &str;

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError>;
}
