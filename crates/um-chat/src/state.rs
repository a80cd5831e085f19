//! Application state shared by the orchestrator, the dispatcher and front-ends

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use um_core::ConnectionSettings;
use um_document::DocumentModel;

use crate::events::ChatEvent;
use crate::session::SessionStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub document: Arc<RwLock<DocumentModel>>,
    pub sessions: Arc<RwLock<SessionStore>>,
    pub connection: Arc<RwLock<ConnectionSettings>>,
    events: broadcast::Sender<ChatEvent>,
}

impl AppState {
    pub fn new(document: DocumentModel, sessions: SessionStore, connection: ConnectionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            document: Arc::new(RwLock::new(document)),
            sessions: Arc::new(RwLock::new(sessions)),
            connection: Arc::new(RwLock::new(connection)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &broadcast::Sender<ChatEvent> {
        &self.events
    }

    pub(crate) fn emit(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Restore the sample methods and clear every chat session.
    /// Connection settings are kept.
    pub async fn reset(&self) {
        self.document.write().await.reset();
        self.sessions.write().await.reset();
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            DocumentModel::default(),
            SessionStore::default(),
            ConnectionSettings::default(),
        )
    }
}
