//! Chat session management
//!
//! Sessions are created lazily: "new chat" only clears the active session
//! (draft state), and the first user message sent in draft state creates one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use um_core::{ChatMessage, FunctionCall, ToolOutcome};

use crate::error::SessionError;

const TITLE_PREVIEW_CHARS: usize = 20;

/// A chat session containing message history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    /// New session titled after the first message
    pub fn new(first_message: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: initial_title(first_message),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Get message count
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// First 20 characters of `text`, with `...` when cut
pub fn initial_title(text: &str) -> String {
    let mut chars = text.chars();
    let preview: String = chars.by_ref().take(TITLE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Ordered sessions, most recently created first, plus the active session id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStore {
    sessions: Vec<ChatSession>,
    #[serde(default)]
    active_session_id: Option<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut ChatSession, SessionError> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub fn active(&self) -> Option<&ChatSession> {
        self.active_session_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    /// Enter draft state. Existing sessions are kept.
    pub fn start_draft(&mut self) {
        self.active_session_id = None;
    }

    /// Append a user message to the active session, creating one in draft state.
    ///
    /// Returns the id of the session when this call created it.
    pub fn append_user_message(&mut self, text: &str) -> Option<String> {
        let created = if self.active().is_some() {
            None
        } else {
            let session = ChatSession::new(text);
            let id = session.id.clone();
            debug!(session = %id, title = %session.title, "Creating chat session");
            self.sessions.insert(0, session);
            self.active_session_id = Some(id.clone());
            Some(id)
        };

        if let Some(session) = self
            .active_session_id
            .clone()
            .and_then(|id| self.sessions.iter_mut().find(|s| s.id == id))
        {
            session.messages.push(ChatMessage::user(text));
        }
        created
    }

    pub fn append_model_message(&mut self, text: &str) -> Result<(), SessionError> {
        self.push_active(ChatMessage::model_text(text))
    }

    pub fn append_function_call(&mut self, call: &FunctionCall) -> Result<(), SessionError> {
        self.push_active(ChatMessage::function_call(call))
    }

    pub fn append_function_result(
        &mut self,
        name: &str,
        outcome: &ToolOutcome,
    ) -> Result<(), SessionError> {
        self.push_active(ChatMessage::function_result(name, outcome))
    }

    fn push_active(&mut self, message: ChatMessage) -> Result<(), SessionError> {
        let id = self
            .active_session_id
            .clone()
            .ok_or(SessionError::NoActiveSession)?;
        self.push_message(&id, message)
    }

    /// Append to a specific session regardless of which one is active
    pub fn push_message(&mut self, session_id: &str, message: ChatMessage) -> Result<(), SessionError> {
        self.get_mut(session_id)?.messages.push(message);
        Ok(())
    }

    /// Message log of one session
    pub fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>, SessionError> {
        self.get(session_id)
            .map(|s| s.messages.clone())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub fn rename_session_title(&mut self, id: &str, title: &str) -> Result<(), SessionError> {
        self.get_mut(id)?.title = title.to_string();
        Ok(())
    }

    pub fn switch_to(&mut self, id: &str) -> Result<(), SessionError> {
        if self.get(id).is_none() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        self.active_session_id = Some(id.to_string());
        Ok(())
    }

    /// Drop every session and return to draft state
    pub fn reset(&mut self) {
        self.sessions.clear();
        self.active_session_id = None;
    }

    /// Clear an active id that points at no session
    pub(crate) fn repair(&mut self) {
        if self.active().is_none() {
            self.active_session_id = None;
        }
    }
}
