//! Tool dispatcher
//!
//! Applies one function call to the document model or hands it to the
//! deployment / shell collaborators.
//!
//! Two failure shapes come out of [`ToolDispatcher::dispatch`]:
//! - `Ok(ToolOutcome { success: false, .. })` for an unknown tool or a shell
//!   connection error; the conversation carries on with that result.
//! - `Err(DispatchError)` when a precondition fails or a collaborator call
//!   fails or times out; the caller ends the turn.
//!
//! [`ToolDispatcher::dispatch_outcome`] folds both into a `ToolOutcome`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use um_core::{ConnectionSettings, FunctionCall, ToolOutcome};
use um_deployment::{ConnectParams, DeployFiles, DeployRequest, Deployer, ShellManager};
use um_document::{generate_artifacts, DocumentModel, MethodUpdate};

use crate::error::DispatchError;
use crate::invocation::ToolInvocation;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct ToolDispatcher {
    document: Arc<RwLock<DocumentModel>>,
    connection: Arc<RwLock<ConnectionSettings>>,
    deployer: Arc<dyn Deployer>,
    shell: Arc<ShellManager>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        document: Arc<RwLock<DocumentModel>>,
        connection: Arc<RwLock<ConnectionSettings>>,
        deployer: Arc<dyn Deployer>,
        shell: Arc<ShellManager>,
    ) -> Self {
        Self {
            document,
            connection,
            deployer,
            shell,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound on deployment and connect calls
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn shell(&self) -> &Arc<ShellManager> {
        &self.shell
    }

    /// Dispatch and fold every error into a failed outcome
    pub async fn dispatch_outcome(&self, call: &FunctionCall) -> ToolOutcome {
        match self.dispatch(call).await {
            Ok(outcome) => outcome,
            Err(e) => e.to_outcome(),
        }
    }

    pub async fn dispatch(&self, call: &FunctionCall) -> Result<ToolOutcome, DispatchError> {
        let invocation = match ToolInvocation::from_call(call) {
            Ok(invocation) => invocation,
            Err(e @ DispatchError::UnknownTool(_)) => {
                warn!(tool = %call.name, "Unknown tool called");
                return Ok(e.to_outcome());
            }
            Err(e) => return Err(e),
        };

        info!(tool = %invocation.name(), "Dispatching tool call");
        let result = match invocation {
            ToolInvocation::UpdateEditorCode { code } => self.update_editor_code(code).await,
            ToolInvocation::DeployToRouter => self.deploy_to_router().await,
            ToolInvocation::AddNewMethod { name } => self.add_new_method(name).await,
            ToolInvocation::SetObjectName { name } => self.set_object_name(name).await,
            ToolInvocation::RenameMethod { old_name, new_name } => {
                self.rename_method(old_name, new_name).await
            }
            ToolInvocation::ConnectSsh => self.connect_ssh().await,
        };

        match &result {
            Ok(outcome) => info!(
                tool = %call.name,
                success = outcome.success,
                "Tool finished: {}",
                outcome.message
            ),
            Err(e) => warn!(tool = %call.name, error = %e, "Tool failed"),
        }
        result
    }

    async fn update_editor_code(&self, code: Option<String>) -> Result<ToolOutcome, DispatchError> {
        let Some(code) = code else {
            return Ok(ToolOutcome::success(""));
        };
        let mut document = self.document.write().await;
        let id = document.selected_id().ok_or(DispatchError::NoActiveMethod)?;
        let written = code.len();
        document.update_method_field(id, MethodUpdate::Code(code))?;
        Ok(ToolOutcome::success(format!(
            "Updated editor code with {} bytes.",
            written
        )))
    }

    async fn deploy_to_router(&self) -> Result<ToolOutcome, DispatchError> {
        let connection = self.connection.read().await.clone();
        connection
            .require_target()
            .map_err(|_| DispatchError::MissingConnectionSettings)?;

        let files = {
            let document = self.document.read().await;
            DeployFiles::from(generate_artifacts(document.methods(), document.meta())?)
        };
        let host = connection.host.clone();
        let request = DeployRequest { connection, files };

        let steps = tokio::time::timeout(self.timeout, self.deployer.deploy(request))
            .await
            .map_err(|_| DispatchError::Timeout {
                tool: crate::definitions::DEPLOY_TO_ROUTER,
                secs: self.timeout.as_secs(),
            })?
            .map_err(DispatchError::Deployment)?;

        let mut message = format!("Deployed to {}.", host);
        for step in &steps {
            message.push('\n');
            message.push_str(step);
        }
        Ok(ToolOutcome::success(message))
    }

    async fn add_new_method(&self, name: Option<String>) -> Result<ToolOutcome, DispatchError> {
        let mut document = self.document.write().await;
        let id = document.add_method();
        if let Some(name) = name {
            document.update_method_field(id, MethodUpdate::Name(name))?;
        }
        let name = document
            .method(id)
            .map(|m| m.name.clone())
            .unwrap_or_default();
        Ok(ToolOutcome::success(format!("Added new method: {}", name)))
    }

    async fn set_object_name(&self, name: Option<String>) -> Result<ToolOutcome, DispatchError> {
        let Some(name) = name else {
            return Ok(ToolOutcome::success(""));
        };
        let mut document = self.document.write().await;
        document.set_object_name(&name);
        Ok(ToolOutcome::success(format!(
            "Set object name to: {}",
            document.meta().object_name
        )))
    }

    async fn rename_method(
        &self,
        old_name: Option<String>,
        new_name: Option<String>,
    ) -> Result<ToolOutcome, DispatchError> {
        let old_name = old_name.unwrap_or_default();
        let mut document = self.document.write().await;

        let id = document
            .find_by_name(&old_name)
            .map(|m| m.id)
            .ok_or_else(|| DispatchError::MethodNotFound(old_name.clone()))?;
        let new_name = new_name.ok_or(DispatchError::MissingArgument {
            tool: crate::definitions::RENAME_METHOD,
            argument: "new_name",
        })?;
        if document
            .methods()
            .iter()
            .any(|m| m.name == new_name && m.id != id)
        {
            return Err(DispatchError::NameCollision(new_name));
        }

        document.update_method_field(id, MethodUpdate::Name(new_name.clone()))?;
        document.select(id)?;
        Ok(ToolOutcome::success(format!(
            "Renamed method \"{}\" to \"{}\".",
            old_name, new_name
        )))
    }

    async fn connect_ssh(&self) -> Result<ToolOutcome, DispatchError> {
        let connection = self.connection.read().await.clone();
        connection
            .require_target()
            .map_err(|_| DispatchError::MissingConnectionSettings)?;

        let params = ConnectParams::from(&connection);
        let target = params.destination();

        match tokio::time::timeout(self.timeout, self.shell.connect(&params)).await {
            Err(_) => Err(DispatchError::Timeout {
                tool: crate::definitions::CONNECT_SSH,
                secs: self.timeout.as_secs(),
            }),
            Ok(Ok(())) => Ok(ToolOutcome::success(format!(
                "Successfully connected to {}.",
                target
            ))),
            Ok(Err(e)) => Ok(ToolOutcome::failure(format!(
                "Failed to connect to {}: {}",
                target, e
            ))),
        }
    }
}
