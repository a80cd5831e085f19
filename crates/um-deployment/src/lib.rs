//! um-deployment: getting generated artifacts onto a router
//!
//! Features:
//! - `Deployer`: upload script + ACL, `chmod +x`, restart rpcd
//! - `SecureShell`: interactive shell sessions
//! - `ShellManager`: at most one live shell session at a time
//! - OpenSSH process backend for both

pub mod error;
pub mod manager;
pub mod openssh;
pub mod transport;

pub use error::TransportError;
pub use manager::ShellManager;
pub use openssh::OpenSshTransport;
pub use transport::{
    remote_path, ConnectParams, DeployFiles, DeployRequest, Deployer, RemoteRunner, RpcdDeployer,
    SecureShell, ShellSession,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::manager::ShellManager;
    pub use super::openssh::OpenSshTransport;
    pub use super::transport::{Deployer, RpcdDeployer, SecureShell, ShellSession};
}
