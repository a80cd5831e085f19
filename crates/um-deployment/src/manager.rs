//! Single live shell session

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::error::TransportError;
use crate::transport::{ConnectParams, SecureShell, ShellSession};

/// Owns at most one live shell session; connecting again replaces it.
pub struct ShellManager {
    shell: Arc<dyn SecureShell>,
    live: Mutex<Option<LiveSession>>,
}

struct LiveSession {
    destination: String,
    session: Box<dyn ShellSession>,
}

impl ShellManager {
    pub fn new(shell: Arc<dyn SecureShell>) -> Self {
        Self {
            shell,
            live: Mutex::new(None),
        }
    }

    /// Close any live session, then open a new one to `params`.
    pub async fn connect(&self, params: &ConnectParams) -> Result<(), TransportError> {
        params.validate()?;
        let mut live = self.live.lock().await;

        if let Some(previous) = live.take() {
            info!(target = %previous.destination, "Closing previous SSH session");
            if let Err(e) = previous.session.close().await {
                warn!("Failed to close previous SSH session: {}", e);
            }
        }

        let session = self.shell.connect(params).await?;
        *live = Some(LiveSession {
            destination: params.destination(),
            session,
        });
        Ok(())
    }

    pub async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let live = self.live.lock().await;
        let live = live.as_ref().ok_or(TransportError::NotConnected)?;
        live.session.write(data).await
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), TransportError> {
        let live = self.live.lock().await;
        let live = live.as_ref().ok_or(TransportError::NotConnected)?;
        live.session.resize(cols, rows).await
    }

    pub async fn subscribe(&self) -> Result<broadcast::Receiver<Vec<u8>>, TransportError> {
        let live = self.live.lock().await;
        live.as_ref()
            .map(|l| l.session.subscribe())
            .ok_or(TransportError::NotConnected)
    }

    /// Drop the live session, if any
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(live) = self.live.lock().await.take() {
            info!(target = %live.destination, "Disconnecting SSH session");
            live.session.close().await?;
        }
        Ok(())
    }

    /// `user@host` of the live session
    pub async fn connected_to(&self) -> Option<String> {
        self.live.lock().await.as_ref().map(|l| l.destination.clone())
    }
}
