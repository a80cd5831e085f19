//! ubus-maker
//!
//! Command line front-end for authoring OpenWrt rpcd UBUS methods:
//! - edit methods, arguments and naming of the saved workspace
//! - preview / write the generated Lua script and ACL policy
//! - deploy to a router over SSH
//! - chat with the assistant, which edits and deploys through tool calls

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use um_chat::{AppState, PersistedState};
use um_core::config::{load_environment, state_file_path};
use um_core::{AssistantSettings, ConnectionSettings};
use um_deployment::{
    DeployFiles, DeployRequest, Deployer, OpenSshTransport, RpcdDeployer, ShellManager,
};
use um_document::generate_artifacts;

mod chat;
mod document;

use document::{DocumentCommand, SessionCommand};

#[derive(Parser, Debug)]
#[command(name = "ubus-maker")]
#[command(about = "Author, preview and deploy OpenWrt rpcd UBUS methods")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Workspace state file (defaults to UM_STATE_FILE or the user data dir)
    #[arg(long, global = true)]
    state: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the generated Lua script and ACL policy
    Preview,

    /// Write the generated Lua script and ACL policy to a directory
    Generate {
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Print the `ubus call` command line for a method
    TestCommand {
        /// Method name (defaults to the selected method)
        method: Option<String>,
    },

    // Method, argument and naming edits
    #[command(flatten)]
    Document(DocumentCommand),

    /// List or switch chat sessions
    Sessions {
        #[command(subcommand)]
        command: Option<SessionCommand>,
    },

    /// Chat with the assistant (interactive unless --message is given)
    Chat {
        /// Send one message and exit
        #[arg(short, long)]
        message: Option<String>,

        /// Start a new session instead of continuing the active one
        #[arg(long)]
        new: bool,
    },

    /// Upload the script and ACL to the router and restart rpcd
    Deploy,

    /// Restore the sample methods and clear every chat session
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from /etc/ubus-maker/environment (if exists)
    load_environment();

    // Logs go to stderr; stdout carries generated artifacts
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ubus_maker=info".parse()?)
                .add_directive("um_chat=info".parse()?)
                .add_directive("um_tools=info".parse()?)
                .add_directive("um_deployment=info".parse()?)
                .add_directive("um_llm=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let state_path = args.state.clone().unwrap_or_else(state_file_path);

    let persisted = match PersistedState::load(&state_path) {
        Ok(state) => state,
        Err(e) => {
            warn!(path = %state_path.display(), "Could not read saved state, starting fresh: {}", e);
            PersistedState::default()
        }
    };
    let state = AppState::new(
        persisted.document,
        persisted.sessions,
        ConnectionSettings::from_env(),
    );

    let changed = match args.command {
        Commands::Preview => {
            let document = state.document.read().await;
            let artifacts = generate_artifacts(document.methods(), document.meta())?;
            println!("-- {}", artifacts.script.filename);
            println!("{}", artifacts.script.content);
            println!("-- {}", artifacts.acl_policy.filename);
            println!("{}", artifacts.acl_policy.content);
            false
        }
        Commands::Generate { out } => {
            let document = state.document.read().await;
            let artifacts = generate_artifacts(document.methods(), document.meta())?;
            std::fs::create_dir_all(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            for file in [&artifacts.script, &artifacts.acl_policy] {
                let path = out.join(&file.filename);
                std::fs::write(&path, &file.content)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("{}", path.display());
            }
            false
        }
        Commands::TestCommand { method } => {
            document::print_test_command(&state, method.as_deref()).await?;
            false
        }
        Commands::Document(command) => document::run(&state, command).await?,
        Commands::Sessions { command } => document::run_sessions(&state, command).await?,
        Commands::Chat { message, new } => {
            let settings = AssistantSettings::from_env();
            chat::run(&state, settings, message, new, &state_path).await?;
            true
        }
        Commands::Deploy => {
            deploy(&state).await?;
            false
        }
        Commands::Reset => {
            state.reset().await;
            println!("Workspace reset to the sample methods.");
            true
        }
    };

    if changed {
        PersistedState::capture(&state)
            .await
            .save(&state_path)
            .with_context(|| format!("saving {}", state_path.display()))?;
        info!(path = %state_path.display(), "Workspace saved");
    }
    Ok(())
}

async fn deploy(state: &AppState) -> Result<()> {
    let connection = state.connection.read().await.clone();
    connection.require_target()?;

    let files = {
        let document = state.document.read().await;
        DeployFiles::from(generate_artifacts(document.methods(), document.meta())?)
    };

    let deployer = RpcdDeployer::new(OpenSshTransport::new());
    info!(target = %connection.target(), "Deploying");
    let steps = deployer
        .deploy(DeployRequest { connection, files })
        .await
        .context("deployment failed")?;
    for step in steps {
        println!("{}", step);
    }
    Ok(())
}

/// Collaborators shared by the chat front-end
pub(crate) fn ssh_collaborators() -> (Arc<dyn Deployer>, Arc<ShellManager>) {
    let transport = OpenSshTransport::new();
    let deployer: Arc<dyn Deployer> = Arc::new(RpcdDeployer::new(transport.clone()));
    let shell = Arc::new(ShellManager::new(Arc::new(transport)));
    (deployer, shell)
}
