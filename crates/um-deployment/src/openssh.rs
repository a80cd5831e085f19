//! OpenSSH process backend
//!
//! Runs the system `ssh` client through `tokio::process`. Password logins go
//! through `sshpass -e` with the password in the `SSHPASS` environment
//! variable; without a password `ssh` runs in batch mode and relies on keys.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::transport::{ConnectParams, RemoteRunner, SecureShell, ShellSession};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// `ssh`/`sshpass` process launcher
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    ssh_program: String,
    connect_timeout: Duration,
}

impl Default for OpenSshTransport {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl OpenSshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Base command for `target`; the caller appends the remote command, if any.
    fn command(&self, target: &ConnectParams, interactive: bool) -> Command {
        let mut cmd = if target.password.is_empty() {
            let mut cmd = Command::new(&self.ssh_program);
            cmd.args(["-o", "BatchMode=yes"]);
            cmd
        } else {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e").arg(&self.ssh_program).env("SSHPASS", &target.password);
            cmd
        };

        cmd.args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
        if interactive {
            // stdin is a pipe, force a remote pty anyway
            cmd.arg("-tt");
        }
        cmd.arg(target.destination()).kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, target: &ConnectParams, err: std::io::Error) -> TransportError {
        let program = if target.password.is_empty() {
            self.ssh_program.as_str()
        } else {
            "sshpass"
        };
        TransportError::Spawn(format!("{}: {}", program, err))
    }
}

#[async_trait]
impl RemoteRunner for OpenSshTransport {
    async fn exec(
        &self,
        target: &ConnectParams,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<String, TransportError> {
        debug!(target = %target.destination(), command = %command, "Running remote command");

        let mut child = self
            .command(target, false)
            .arg(command)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(target, e))?;

        if let Some(data) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(data).await?;
                pipe.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            error!(command = %command, code, stderr = %stderr, "Remote command failed");
            return Err(TransportError::RemoteCommand {
                command: command.to_string(),
                code,
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SecureShell for OpenSshTransport {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn ShellSession>, TransportError> {
        params.validate()?;

        // Authenticate once up front so a bad login fails the connect call
        let probe_timeout = self.connect_timeout + Duration::from_secs(5);
        match tokio::time::timeout(probe_timeout, self.exec(params, "true", None)).await {
            Ok(result) => result.map(|_| ())?,
            Err(_) => return Err(TransportError::Timeout(probe_timeout.as_secs())),
        }

        let mut child = self
            .command(params, true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(params, e))?;

        let (output, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, output.clone()));
        }

        info!(target = %params.destination(), "SSH shell session opened");
        Ok(Box::new(OpenSshSession {
            destination: params.destination(),
            stdin: Mutex::new(child.stdin.take()),
            child: Mutex::new(Some(child)),
            output,
        }))
    }
}

async fn forward_output<R>(mut reader: R, output: broadcast::Sender<Vec<u8>>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                // No subscribers is fine, output is dropped
                let _ = output.send(buf[..n].to_vec());
            }
            Err(e) => {
                warn!("SSH output read failed: {}", e);
                break;
            }
        }
    }
}

/// Interactive `ssh -tt` process
pub struct OpenSshSession {
    destination: String,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
    output: broadcast::Sender<Vec<u8>>,
}

#[async_trait]
impl ShellSession for OpenSshSession {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut stdin = self.stdin.lock().await;
        let pipe = stdin.as_mut().ok_or(TransportError::NotConnected)?;
        pipe.write_all(data).await?;
        pipe.flush().await?;
        Ok(())
    }

    async fn resize(&self, _cols: u16, _rows: u16) -> Result<(), TransportError> {
        // Window-change requests need a pty on our side, which a piped ssh lacks
        Err(TransportError::Unsupported("resize on a piped ssh session"))
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output.subscribe()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.stdin.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.start_kill() {
                debug!("ssh process already gone: {}", e);
            }
            let _ = child.wait().await;
            info!(target = %self.destination, "SSH shell session closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_key_based_command() {
        let transport = OpenSshTransport::new();
        let params = ConnectParams::new("192.168.1.1", "root", "");
        let cmd = transport.command(&params, false);

        assert_eq!(cmd.as_std().get_program(), "ssh");
        assert_eq!(
            args_of(&cmd),
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ConnectTimeout=20",
                "root@192.168.1.1"
            ]
        );
    }

    #[test]
    fn test_password_command_uses_sshpass_env() {
        let transport = OpenSshTransport::new().with_connect_timeout(Duration::from_secs(5));
        let params = ConnectParams::new("10.0.0.1", "admin", "secret");
        let cmd = transport.command(&params, true);

        assert_eq!(cmd.as_std().get_program(), "sshpass");
        let args = args_of(&cmd);
        assert_eq!(&args[..2], &["-e", "ssh"]);
        assert!(args.contains(&"-tt".to_string()));
        assert!(args.contains(&"ConnectTimeout=5".to_string()));
        assert!(!args.iter().any(|a| a.contains("secret")));

        let envs: Vec<_> = cmd.as_std().get_envs().collect();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].0, "SSHPASS");
    }

    #[tokio::test]
    async fn test_connect_without_user_never_spawns() {
        let transport = OpenSshTransport::new();
        let result = transport.connect(&ConnectParams::new("10.0.0.1", "", "")).await;
        assert!(matches!(result, Err(TransportError::MissingSettings)));
    }
}
