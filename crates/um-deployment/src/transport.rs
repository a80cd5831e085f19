//! Collaborator traits for deployment and shell access, plus the rpcd deploy sequence

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use um_core::ConnectionSettings;
use um_document::{Artifacts, GeneratedFile};

use crate::error::TransportError;

pub const RPCD_RESTART: &str = "/etc/init.d/rpcd restart";

/// Who to connect to
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.trim().is_empty() || self.username.trim().is_empty() {
            return Err(TransportError::MissingSettings);
        }
        Ok(())
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl From<&ConnectionSettings> for ConnectParams {
    fn from(settings: &ConnectionSettings) -> Self {
        Self::new(&settings.host, &settings.username, &settings.password)
    }
}

/// The two files a deployment uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployFiles {
    pub script: GeneratedFile,
    pub acl_policy: GeneratedFile,
}

impl From<Artifacts> for DeployFiles {
    fn from(artifacts: Artifacts) -> Self {
        Self {
            script: artifacts.script,
            acl_policy: artifacts.acl_policy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub connection: ConnectionSettings,
    pub files: DeployFiles,
}

/// Deployment collaborator: upload then restart, returning one line per step
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, request: DeployRequest) -> Result<Vec<String>, TransportError>;
}

/// A live interactive shell
#[async_trait]
pub trait ShellSession: Send + Sync {
    /// Pass bytes through to the remote shell, in order
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), TransportError>;

    /// Output stream of the remote shell
    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Secure shell collaborator
#[async_trait]
pub trait SecureShell: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn ShellSession>, TransportError>;
}

/// One-shot remote command execution, the primitive the deploy sequence is built from
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    /// Run `command` on `target`, feeding `stdin` if given. Returns stdout.
    async fn exec(
        &self,
        target: &ConnectParams,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<String, TransportError>;
}

/// POSIX join of a remote directory and a file name
pub fn remote_path(dir: &str, filename: &str) -> String {
    if dir.is_empty() {
        return filename.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), filename.trim_start_matches('/'))
}

/// Double-quote a remote path for the shell
pub(crate) fn quote_path(path: &str) -> String {
    format!("\"{}\"", path.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Deploys to rpcd: `cat >` upload, `chmod +x` for the script, then restart rpcd.
pub struct RpcdDeployer<R> {
    runner: R,
}

impl<R: RemoteRunner> RpcdDeployer<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn upload(&self, target: &ConnectParams, path: &str, content: &str) -> Result<(), TransportError> {
        debug!(path = %path, bytes = content.len(), "Uploading file");
        self.runner
            .exec(target, &format!("cat > {}", quote_path(path)), Some(content.as_bytes()))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl<R: RemoteRunner> Deployer for RpcdDeployer<R> {
    async fn deploy(&self, request: DeployRequest) -> Result<Vec<String>, TransportError> {
        let target = ConnectParams::from(&request.connection);
        target.validate()?;

        info!(target = %target.destination(), "Deploying to router");
        let mut steps = Vec::new();

        let script = &request.files.script;
        if !script.content.is_empty() {
            let path = remote_path(&request.connection.script_path, &script.filename);
            self.upload(&target, &path, &script.content).await?;
            self.runner
                .exec(&target, &format!("chmod +x {}", quote_path(&path)), None)
                .await?;
            steps.push(format!("Uploaded & chmod +x: {}", path));
        }

        let acl = &request.files.acl_policy;
        if !acl.content.is_empty() {
            let path = remote_path(&request.connection.acl_path, &acl.filename);
            self.upload(&target, &path, &acl.content).await?;
            steps.push(format!("Uploaded: {}", path));
        }

        self.runner.exec(&target, RPCD_RESTART, None).await?;
        steps.push(format!("Executed: {}", RPCD_RESTART));

        info!(target = %target.destination(), steps = steps.len(), "Deployment complete");
        Ok(steps)
    }
}
