//! Common types shared by the assistant, the tool dispatcher and the completion client

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a chat session's message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessage {
    /// Text typed by the user
    User { text: String },
    /// Plain text returned by the model
    ModelText { text: String },
    /// The model asked for a tool invocation
    ModelFunctionCall { name: String, arguments: Value },
    /// Result of a tool invocation, fed back to the model
    FunctionResult {
        name: String,
        result: String,
        #[serde(default = "default_success")]
        success: bool,
    },
}

fn default_success() -> bool {
    true
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::ModelText { text: text.into() }
    }

    pub fn function_call(call: &FunctionCall) -> Self {
        Self::ModelFunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }
    }

    pub fn function_result(name: impl Into<String>, outcome: &ToolOutcome) -> Self {
        Self::FunctionResult {
            name: name.into(),
            result: outcome.message.clone(),
            success: outcome.success,
        }
    }

    /// Role as seen by the completion service
    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::ModelText { .. } | Self::ModelFunctionCall { .. } => "model",
            Self::FunctionResult { .. } => "function",
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

/// A single structured function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default = "empty_object", alias = "args")]
    pub arguments: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// String argument lookup; non-string values are treated as absent.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Tool schema advertised to the completion service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of dispatching one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub message: String,
}

impl ToolOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
