//! Notifications for front-ends that render sessions and messages

use serde::Serialize;
use um_core::{ChatMessage, ToolOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    SessionCreated {
        session_id: String,
        title: String,
    },
    SessionTitleChanged {
        session_id: String,
        title: String,
    },
    MessageAppended {
        session_id: String,
        message: ChatMessage,
    },
    ToolExecuted {
        session_id: String,
        tool: String,
        outcome: ToolOutcome,
    },
}
