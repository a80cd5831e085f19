//! Background session titling

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use um_core::ChatMessage;
use um_llm::{CompletionRequest, CompletionService};

use crate::events::ChatEvent;
use crate::session::SessionStore;

pub const TITLE_SYSTEM_MESSAGE: &str = "You are a helpful assistant that generates short, concise titles for chat sessions. Do not use quotes.";

pub fn title_prompt(text: &str) -> String {
    format!(
        "Generate a very short title (max 5 words) summarizing this user request: \"{}\"",
        text
    )
}

/// Trim and strip one leading and one trailing quote. `None` when nothing is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_suffix(['"', '\''])
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Ask for a better title without blocking the turn.
///
/// One attempt, no tools. On success the session is renamed and a
/// [`ChatEvent::SessionTitleChanged`] is sent; failures are only logged.
pub fn spawn_title_request(
    completion: Arc<dyn CompletionService>,
    sessions: Arc<RwLock<SessionStore>>,
    events: broadcast::Sender<ChatEvent>,
    session_id: String,
    first_message: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let request = CompletionRequest::new(vec![ChatMessage::user(title_prompt(&first_message))])
            .with_system_message(TITLE_SYSTEM_MESSAGE);

        let response = match completion.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(session = %session_id, "Title generation failed: {}", e);
                return;
            }
        };

        let Some(title) = response.text.as_deref().and_then(clean_title) else {
            debug!(session = %session_id, "Title response had no usable text");
            return;
        };

        if let Err(e) = sessions.write().await.rename_session_title(&session_id, &title) {
            // Session dropped by a reset while the request was in flight
            debug!(session = %session_id, "Skipping title update: {}", e);
            return;
        }
        debug!(session = %session_id, title = %title, "Session retitled");
        let _ = events.send(ChatEvent::SessionTitleChanged { session_id, title });
    })
}
