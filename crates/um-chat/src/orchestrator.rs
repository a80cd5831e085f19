//! Conversation orchestrator
//!
//! One call to [`ConversationOrchestrator::send`] is one turn: the user
//! message is recorded, then completion requests and tool dispatches
//! alternate until the model answers without a function call.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use um_core::{AssistantSettings, ChatMessage, FunctionCall};
use um_llm::{CompletionError, CompletionRequest, CompletionResponse, CompletionService};
use um_tools::{enabled_tools, ToolDispatcher};

use crate::error::{OrchestratorError, SessionError};
use crate::events::ChatEvent;
use crate::state::AppState;
use crate::title::spawn_title_request;

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEnd {
    /// The model answered without calling a tool
    Completed,
    /// A dispatch failed; its failed result is the last message in the session
    ToolFailed { tool: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub session_id: String,
    pub created_session: bool,
    /// Completion requests made during the turn
    pub rounds: usize,
    pub end: TurnEnd,
}

pub struct ConversationOrchestrator {
    state: AppState,
    completion: Arc<dyn CompletionService>,
    dispatcher: Arc<ToolDispatcher>,
    settings: AssistantSettings,
    turn: Mutex<()>,
}

impl ConversationOrchestrator {
    pub fn new(
        state: AppState,
        completion: Arc<dyn CompletionService>,
        dispatcher: Arc<ToolDispatcher>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            state,
            completion,
            dispatcher,
            settings,
            turn: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn settings(&self) -> &AssistantSettings {
        &self.settings
    }

    /// Run one turn for `text`.
    ///
    /// Only one turn runs at a time; a second call while one is in flight
    /// gets [`OrchestratorError::Busy`]. Completion errors end the turn and
    /// are not recorded in the session.
    pub async fn send(&self, text: &str) -> Result<TurnReport, OrchestratorError> {
        let _turn = self.turn.try_lock().map_err(|_| OrchestratorError::Busy)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(OrchestratorError::EmptyMessage);
        }

        let (session_id, created) = {
            let mut sessions = self.state.sessions.write().await;
            let created = sessions.append_user_message(text);
            let id = sessions
                .active_id()
                .map(str::to_string)
                .ok_or(SessionError::NoActiveSession)?;
            (id, created.is_some())
        };

        if created {
            let title = self
                .state
                .sessions
                .read()
                .await
                .get(&session_id)
                .map(|s| s.title.clone())
                .unwrap_or_default();
            info!(session = %session_id, "Started chat session");
            self.state.emit(ChatEvent::SessionCreated {
                session_id: session_id.clone(),
                title,
            });
            spawn_title_request(
                self.completion.clone(),
                self.state.sessions.clone(),
                self.state.events().clone(),
                session_id.clone(),
                text.to_string(),
            );
        }
        self.state.emit(ChatEvent::MessageAppended {
            session_id: session_id.clone(),
            message: ChatMessage::user(text),
        });

        let tools = enabled_tools(&self.settings);
        let max_rounds = self.settings.max_tool_rounds.max(1);

        for round in 1..=max_rounds {
            let history = self.state.sessions.read().await.history(&session_id)?;
            let mut request = CompletionRequest::new(history)
                .with_system_message(self.settings.system_message.clone());
            if !tools.is_empty() {
                request = request.with_tools(tools.clone());
            }

            debug!(session = %session_id, round, "Requesting completion");
            let response = self.complete(request).await?;

            if let Some(reply) = response.text.as_deref() {
                self.record(&session_id, ChatMessage::model_text(reply)).await?;
            }

            let Some(call) = response.function_call else {
                return Ok(TurnReport {
                    session_id,
                    created_session: created,
                    rounds: round,
                    end: TurnEnd::Completed,
                });
            };

            if let Some(end) = self.run_tool(&session_id, &call).await? {
                return Ok(TurnReport {
                    session_id,
                    created_session: created,
                    rounds: round,
                    end,
                });
            }
        }

        warn!(session = %session_id, max_rounds, "Turn stopped at the round limit");
        Err(OrchestratorError::RoundLimitExceeded(max_rounds))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let timeout = self.settings.request_timeout();
        match tokio::time::timeout(timeout, self.completion.complete(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                error!(service = %self.completion.name(), "Completion failed: {}", e);
                Err(e)
            }
            Err(_) => {
                error!(service = %self.completion.name(), "Completion timed out");
                Err(CompletionError::Timeout(timeout.as_secs()))
            }
        }
    }

    /// Record the call, dispatch it, record the result.
    /// `Some` when the failure ends the turn.
    async fn run_tool(
        &self,
        session_id: &str,
        call: &FunctionCall,
    ) -> Result<Option<TurnEnd>, OrchestratorError> {
        self.record(session_id, ChatMessage::function_call(call)).await?;
        debug!(session = %session_id, tool = %call.name, "Model requested a tool");

        let (outcome, end) = match self.dispatcher.dispatch(call).await {
            Ok(outcome) => (outcome, None),
            Err(e) => {
                warn!(tool = %call.name, "Tool call failed: {}", e);
                let end = TurnEnd::ToolFailed {
                    tool: call.name.clone(),
                    error: e.to_string(),
                };
                (e.to_outcome(), Some(end))
            }
        };

        self.record(session_id, ChatMessage::function_result(&call.name, &outcome))
            .await?;
        self.state.emit(ChatEvent::ToolExecuted {
            session_id: session_id.to_string(),
            tool: call.name.clone(),
            outcome,
        });
        Ok(end)
    }

    async fn record(&self, session_id: &str, message: ChatMessage) -> Result<(), OrchestratorError> {
        self.state
            .sessions
            .write()
            .await
            .push_message(session_id, message.clone())?;
        self.state.emit(ChatEvent::MessageAppended {
            session_id: session_id.to_string(),
            message,
        });
        Ok(())
    }
}
