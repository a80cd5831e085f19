//! um-chat: conversation layer for ubus-maker
//!
//! Chat sessions, the application state they share with the document model,
//! and the orchestrator that turns one user message into a sequence of
//! completion requests and tool dispatches.

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod store;
pub mod title;

// Re-export main types
pub use error::{OrchestratorError, SessionError};
pub use events::ChatEvent;
pub use orchestrator::{ConversationOrchestrator, TurnEnd, TurnReport};
pub use session::{ChatSession, SessionStore};
pub use state::AppState;
pub use store::PersistedState;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{AppState, ChatEvent, ConversationOrchestrator, SessionStore};
}
