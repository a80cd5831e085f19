//! Integration tests for the conversation loop against scripted collaborators

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;
    use tokio::sync::{broadcast, Notify};

    use um_chat::title::TITLE_SYSTEM_MESSAGE;
    use um_chat::{AppState, ChatEvent, ConversationOrchestrator, OrchestratorError, TurnEnd};
    use um_core::{AssistantSettings, ChatMessage, ConnectionSettings, FunctionCall};
    use um_deployment::{
        ConnectParams, DeployRequest, Deployer, SecureShell, ShellManager, ShellSession,
        TransportError,
    };
    use um_document::DocumentModel;
    use um_llm::{CompletionError, CompletionRequest, CompletionResponse, CompletionService};
    use um_tools::{ToolDispatcher, TOOL_NAMES};

    /// Answers title requests with a fixed title and everything else from a script
    struct ScriptedCompletion {
        script: StdMutex<VecDeque<Result<CompletionResponse, CompletionError>>>,
        requests: StdMutex<Vec<CompletionRequest>>,
        title: Option<String>,
        gate: Option<Arc<Notify>>,
        started: Arc<Notify>,
    }

    impl ScriptedCompletion {
        fn new(script: Vec<Result<CompletionResponse, CompletionError>>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                requests: StdMutex::new(Vec::new()),
                title: Some("\"Wifi Clients\"".to_string()),
                gate: None,
                started: Arc::new(Notify::new()),
            }
        }

        fn without_title(mut self) -> Self {
            self.title = None;
            self
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn turn_requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
            if request.system_message.as_deref() == Some(TITLE_SYSTEM_MESSAGE) {
                return match &self.title {
                    Some(title) => Ok(CompletionResponse::text(title.clone())),
                    None => Err(CompletionError::no_text()),
                };
            }

            self.requests.lock().unwrap().push(request);
            if let Some(gate) = &self.gate {
                self.started.notify_one();
                gate.notified().await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionResponse::text("(script exhausted)")))
        }
    }

    #[derive(Default)]
    struct RecordingDeployer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Deployer for RecordingDeployer {
        async fn deploy(&self, request: DeployRequest) -> Result<Vec<String>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                format!("Uploaded & chmod +x: /usr/libexec/rpcd/{}", request.files.script.filename),
                "Executed: /etc/init.d/rpcd restart".to_string(),
            ])
        }
    }

    struct IdleSession(broadcast::Sender<Vec<u8>>);

    #[async_trait]
    impl ShellSession for IdleSession {
        async fn write(&self, _data: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
        async fn resize(&self, _cols: u16, _rows: u16) -> Result<(), TransportError> {
            Ok(())
        }
        fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
            self.0.subscribe()
        }
        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingShell {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SecureShell for RecordingShell {
        async fn connect(&self, _params: &ConnectParams) -> Result<Box<dyn ShellSession>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (tx, _) = broadcast::channel(4);
            Ok(Box::new(IdleSession(tx)))
        }
    }

    struct Harness {
        orchestrator: Arc<ConversationOrchestrator>,
        completion: Arc<ScriptedCompletion>,
        deployer: Arc<RecordingDeployer>,
        shell: Arc<RecordingShell>,
        state: AppState,
    }

    fn harness_with(
        completion: ScriptedCompletion,
        connection: ConnectionSettings,
        settings: AssistantSettings,
    ) -> Harness {
        let state = AppState::new(DocumentModel::default(), Default::default(), connection);
        let completion = Arc::new(completion);
        let deployer = Arc::new(RecordingDeployer::default());
        let shell = Arc::new(RecordingShell::default());
        let dispatcher = ToolDispatcher::new(
            state.document.clone(),
            state.connection.clone(),
            deployer.clone(),
            Arc::new(ShellManager::new(shell.clone())),
        );
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            state.clone(),
            completion.clone(),
            Arc::new(dispatcher),
            settings,
        ));
        Harness {
            orchestrator,
            completion,
            deployer,
            shell,
            state,
        }
    }

    fn harness(script: Vec<Result<CompletionResponse, CompletionError>>) -> Harness {
        harness_with(
            ScriptedCompletion::new(script),
            ConnectionSettings::default(),
            AssistantSettings::default(),
        )
    }

    fn call(name: &str, args: serde_json::Value) -> Result<CompletionResponse, CompletionError> {
        Ok(CompletionResponse::function_call(FunctionCall::new(name, args)))
    }

    async fn active_messages(state: &AppState) -> Vec<ChatMessage> {
        state
            .sessions
            .read()
            .await
            .active()
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_text_reply_ends_turn() {
        let h = harness(vec![Ok(CompletionResponse::text("Hello! What should we build?"))]);

        let report = h.orchestrator.send("  hi there  ").await.unwrap();
        assert_eq!(report.end, TurnEnd::Completed);
        assert_eq!(report.rounds, 1);
        assert!(report.created_session);

        let messages = active_messages(&h.state).await;
        assert_eq!(
            messages,
            vec![
                ChatMessage::user("hi there"),
                ChatMessage::model_text("Hello! What should we build?"),
            ]
        );

        let requests = h.completion.turn_requests();
        let tools = requests[0].tools.as_ref().expect("tools are advertised");
        assert_eq!(tools.len(), TOOL_NAMES.len());
        assert_eq!(
            requests[0].system_message.as_deref(),
            Some(AssistantSettings::default().system_message.as_str())
        );
    }

    #[tokio::test]
    async fn test_tool_results_feed_the_next_request() {
        let h = harness(vec![
            call("add_new_method", json!({ "name": "get_clients" })),
            call("set_object_name", json!({ "name": "wifi" })),
            Ok(CompletionResponse::text("Added get_clients to wifi.")),
        ]);

        let report = h.orchestrator.send("Add a get_clients method to wifi").await.unwrap();
        assert_eq!(report.end, TurnEnd::Completed);
        assert_eq!(report.rounds, 3);

        {
            let document = h.state.document.read().await;
            assert!(document.find_by_name("get_clients").is_some());
            assert_eq!(document.meta().object_name, "wifi");
        }

        let roles: Vec<_> = active_messages(&h.state).await.iter().map(|m| m.role()).collect();
        assert_eq!(
            roles,
            vec!["user", "model", "function", "model", "function", "model"]
        );

        let requests = h.completion.turn_requests();
        assert_eq!(requests.len(), 3);
        match requests[1].history.last() {
            Some(ChatMessage::FunctionResult { name, result, success }) => {
                assert_eq!(name, "add_new_method");
                assert_eq!(result, "Added new method: get_clients");
                assert!(success);
            }
            other => panic!("expected a function result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_dispatch_ends_turn_without_another_request() {
        let h = harness(vec![
            call("rename_method", json!({ "old_name": "sampleA", "new_name": "sampleB" })),
            Ok(CompletionResponse::text("never requested")),
        ]);

        let report = h.orchestrator.send("rename sampleA to sampleB").await.unwrap();
        assert_eq!(
            report.end,
            TurnEnd::ToolFailed {
                tool: "rename_method".to_string(),
                error: "Method name \"sampleB\" already exists.".to_string(),
            }
        );
        assert_eq!(h.completion.turn_requests().len(), 1);

        match active_messages(&h.state).await.last() {
            Some(ChatMessage::FunctionResult { success, result, .. }) => {
                assert!(!success);
                assert_eq!(result, "Method name \"sampleB\" already exists.");
            }
            other => panic!("expected a failed function result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_and_turn_continues() {
        let h = harness(vec![
            call("format_disk", json!({})),
            Ok(CompletionResponse::text("I can't do that.")),
        ]);

        let report = h.orchestrator.send("wipe it").await.unwrap();
        assert_eq!(report.end, TurnEnd::Completed);
        assert_eq!(report.rounds, 2);

        let messages = active_messages(&h.state).await;
        assert!(messages.contains(&ChatMessage::FunctionResult {
            name: "format_disk".to_string(),
            result: "Unknown tool called: format_disk".to_string(),
            success: false,
        }));
    }

    #[tokio::test]
    async fn test_deploy_without_settings_never_reaches_deployer() {
        let connection = ConnectionSettings {
            host: String::new(),
            ..ConnectionSettings::default()
        };
        let h = harness_with(
            ScriptedCompletion::new(vec![call("deploy_to_router", json!({}))]),
            connection,
            AssistantSettings::default(),
        );

        let report = h.orchestrator.send("deploy it").await.unwrap();
        assert!(matches!(report.end, TurnEnd::ToolFailed { ref tool, .. } if tool == "deploy_to_router"));
        assert_eq!(h.deployer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deploy_and_connect_use_collaborators() {
        let h = harness(vec![
            call("deploy_to_router", json!({})),
            call("connect_ssh", json!({})),
            Ok(CompletionResponse::text("Deployed and connected.")),
        ]);

        let report = h.orchestrator.send("ship it").await.unwrap();
        assert_eq!(report.end, TurnEnd::Completed);
        assert_eq!(h.deployer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.shell.calls.load(Ordering::SeqCst), 1);

        let results: Vec<_> = active_messages(&h.state)
            .await
            .into_iter()
            .filter_map(|m| match m {
                ChatMessage::FunctionResult { result, .. } => Some(result),
                _ => None,
            })
            .collect();
        assert!(results[0].starts_with("Deployed to 192.168.1.1."));
        assert_eq!(results[1], "Successfully connected to root@192.168.1.1.");
    }

    #[tokio::test]
    async fn test_completion_error_is_not_recorded() {
        let h = harness(vec![Err(CompletionError::MissingCredential)]);

        let err = h.orchestrator.send("hello").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Completion(CompletionError::MissingCredential)));
        assert_eq!(err.to_string(), "API Key is missing. Please set it in Settings.");
        assert_eq!(active_messages(&h.state).await, vec![ChatMessage::user("hello")]);
    }

    #[tokio::test]
    async fn test_round_limit() {
        let settings = AssistantSettings {
            max_tool_rounds: 2,
            ..AssistantSettings::default()
        };
        let h = harness_with(
            ScriptedCompletion::new(vec![
                call("add_new_method", json!({})),
                call("add_new_method", json!({})),
                call("add_new_method", json!({})),
            ]),
            ConnectionSettings::default(),
            settings,
        );

        let err = h.orchestrator.send("keep adding").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::RoundLimitExceeded(2)));
        assert_eq!(h.completion.turn_requests().len(), 2);
        assert_eq!(h.state.document.read().await.methods().len(), 5);
    }

    #[tokio::test]
    async fn test_all_tools_disabled_omits_tool_schema() {
        let settings = AssistantSettings {
            disabled_tools: TOOL_NAMES.iter().map(|n| n.to_string()).collect(),
            ..AssistantSettings::default()
        };
        let h = harness_with(
            ScriptedCompletion::new(vec![Ok(CompletionResponse::text("ok"))]),
            ConnectionSettings::default(),
            settings,
        );

        h.orchestrator.send("hi").await.unwrap();
        assert!(h.completion.turn_requests()[0].tools.is_none());
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let h = harness(vec![]);
        assert!(matches!(
            h.orchestrator.send("   ").await,
            Err(OrchestratorError::EmptyMessage)
        ));
        assert!(h.state.sessions.read().await.list_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_second_send_while_busy() {
        let gate = Arc::new(Notify::new());
        let completion = ScriptedCompletion::new(vec![Ok(CompletionResponse::text("done"))])
            .without_title()
            .gated(gate.clone());
        let started = completion.started.clone();
        let h = harness_with(completion, ConnectionSettings::default(), AssistantSettings::default());

        let orchestrator = h.orchestrator.clone();
        let first = tokio::spawn(async move { orchestrator.send("first").await });
        started.notified().await;

        assert!(matches!(
            h.orchestrator.send("second").await,
            Err(OrchestratorError::Busy)
        ));

        gate.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.end, TurnEnd::Completed);
        assert_eq!(active_messages(&h.state).await.len(), 2);
    }

    #[tokio::test]
    async fn test_sessions_and_background_title() {
        let h = harness(vec![
            Ok(CompletionResponse::text("one")),
            Ok(CompletionResponse::text("two")),
        ]);
        let mut events = h.state.subscribe();

        let first = h
            .orchestrator
            .send("Create a method that lists wifi clients")
            .await
            .unwrap();
        let second = h.orchestrator.send("and make it read-only").await.unwrap();
        assert!(first.created_session);
        assert!(!second.created_session);
        assert_eq!(first.session_id, second.session_id);

        let title = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(ChatEvent::SessionTitleChanged { title, .. }) => break title,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream closed: {}", e),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(title, "Wifi Clients");

        let sessions = h.state.sessions.read().await;
        assert_eq!(sessions.list_sessions().len(), 1);
        assert_eq!(sessions.active().unwrap().title, "Wifi Clients");
        assert_eq!(sessions.active().unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_new_chat_starts_a_new_session_on_next_message() {
        let h = harness(vec![
            Ok(CompletionResponse::text("one")),
            Ok(CompletionResponse::text("two")),
        ]);

        let first = h.orchestrator.send("first topic").await.unwrap();
        h.state.sessions.write().await.start_draft();
        let second = h.orchestrator.send("second topic").await.unwrap();

        assert!(second.created_session);
        assert_ne!(first.session_id, second.session_id);
        let sessions = h.state.sessions.read().await;
        assert_eq!(sessions.list_sessions()[0].id, second.session_id);
        assert_eq!(sessions.list_sessions()[1].id, first.session_id);
    }
}
