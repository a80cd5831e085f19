//! Interactive chat front-end

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use um_chat::{AppState, ChatEvent, ConversationOrchestrator, PersistedState, TurnEnd};
use um_core::AssistantSettings;
use um_llm::{CompletionService, GeminiClient};
use um_tools::ToolDispatcher;

use crate::document::render_message;

const TITLE_WAIT: Duration = Duration::from_secs(10);

const HELP: &str = "\
/new               start a new session with the next message
/sessions          list sessions
/switch <id>       continue another session
/reset             restore the sample methods and clear all sessions
/quit              leave";

pub async fn run(
    state: &AppState,
    settings: AssistantSettings,
    message: Option<String>,
    new_session: bool,
    state_path: &Path,
) -> Result<()> {
    let completion: Arc<dyn CompletionService> = Arc::new(GeminiClient::from_settings(&settings));
    let (deployer, shell) = crate::ssh_collaborators();
    let dispatcher = Arc::new(
        ToolDispatcher::new(
            state.document.clone(),
            state.connection.clone(),
            deployer,
            shell.clone(),
        )
        .with_timeout(settings.request_timeout()),
    );
    let orchestrator = ConversationOrchestrator::new(state.clone(), completion, dispatcher, settings);

    if new_session {
        state.sessions.write().await.start_draft();
    }

    match message {
        Some(message) => {
            let mut events = state.subscribe();
            if let Some(session_id) = send(&orchestrator, &message).await {
                // Give the background title request a chance to land before exit
                let _ = tokio::time::timeout(TITLE_WAIT, wait_for_title(&mut events, &session_id)).await;
            }
        }
        None => {
            let titles = tokio::spawn(print_titles(state.subscribe()));
            repl(&orchestrator, state_path).await?;
            titles.abort();
        }
    }

    if let Err(e) = shell.disconnect().await {
        warn!("Failed to close SSH session: {}", e);
    }
    Ok(())
}

async fn repl(orchestrator: &ConversationOrchestrator, state_path: &Path) -> Result<()> {
    let state = orchestrator.state();
    println!("ubus-maker assistant ({}). /help for commands.", orchestrator.settings().model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{}", HELP),
            ("/new", _) => {
                state.sessions.write().await.start_draft();
                println!("New chat. The next message starts a session.");
            }
            ("/sessions", _) => {
                let sessions = state.sessions.read().await;
                for session in sessions.list_sessions() {
                    let marker = if sessions.active_id() == Some(session.id.as_str()) { "*" } else { " " };
                    println!("{} {}  {}", marker, session.id, session.title);
                }
            }
            ("/switch", id) => match state.sessions.write().await.switch_to(id.trim()) {
                Ok(()) => println!("Switched to {}", id.trim()),
                Err(e) => println!("Error: {}", e),
            },
            ("/reset", _) => {
                state.reset().await;
                println!("Workspace reset to the sample methods.");
            }
            _ => {
                send(orchestrator, line).await;
            }
        }

        if let Err(e) = PersistedState::capture(state).await.save(state_path) {
            warn!(path = %state_path.display(), "Failed to save workspace: {}", e);
        }
    }
    Ok(())
}

/// Run one turn and print what it added. Returns the session id of a newly created session.
async fn send(orchestrator: &ConversationOrchestrator, text: &str) -> Option<String> {
    let state = orchestrator.state();
    let before = state
        .sessions
        .read()
        .await
        .active()
        .map(|s| s.message_count() + 1)
        .unwrap_or(1);

    match orchestrator.send(text).await {
        Ok(report) => {
            print_since(state, &report.session_id, before).await;
            if let TurnEnd::ToolFailed { tool, .. } = &report.end {
                debug!(tool = %tool, "Turn ended on a failed tool call");
            }
            report.created_session.then_some(report.session_id)
        }
        Err(e) => {
            let active = state.sessions.read().await.active_id().map(str::to_string);
            if let Some(id) = active {
                print_since(state, &id, before).await;
            }
            println!("Error: {}", e);
            None
        }
    }
}

async fn print_since(state: &AppState, session_id: &str, from: usize) {
    let sessions = state.sessions.read().await;
    if let Some(session) = sessions.get(session_id) {
        for message in session.messages.iter().skip(from) {
            println!("{}", render_message(message));
        }
    }
}

async fn print_titles(mut events: broadcast::Receiver<ChatEvent>) {
    loop {
        match events.recv().await {
            Ok(ChatEvent::SessionTitleChanged { title, .. }) => println!("\n(session: {})", title),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn wait_for_title(events: &mut broadcast::Receiver<ChatEvent>, session_id: &str) {
    loop {
        match events.recv().await {
            Ok(ChatEvent::SessionTitleChanged { session_id: id, title }) if id == session_id => {
                println!("(session: {})", title);
                break;
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
