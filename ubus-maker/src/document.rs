//! Document and session subcommands

use anyhow::{anyhow, bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use std::io::Read;
use std::path::PathBuf;

use um_chat::AppState;
use um_core::ChatMessage;
use um_document::{
    test_command, AclPermission, ArgType, ArgUpdate, DocumentModel, MethodMode, MethodUpdate,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Auto,
    Manual,
}

impl From<ModeArg> for MethodMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => MethodMode::Auto,
            ModeArg::Manual => MethodMode::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PermissionArg {
    Read,
    Write,
}

impl From<PermissionArg> for AclPermission {
    fn from(permission: PermissionArg) -> Self {
        match permission {
            PermissionArg::Read => AclPermission::Read,
            PermissionArg::Write => AclPermission::Write,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum DocumentCommand {
    /// List methods with their validation state
    Methods,

    /// Print one method (defaults to the selected method)
    Show { method: Option<String> },

    /// Add a method and select it
    Add {
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete a method
    Delete { method: String },

    /// Rename a method
    Rename { method: String, new_name: String },

    /// Select the method the assistant edits
    Select { method: String },

    /// Switch a method between auto and manual response handling
    SetMode {
        method: String,
        #[arg(value_enum)]
        mode: ModeArg,
    },

    /// Set the ACL permission a method is listed under
    SetPermission {
        method: String,
        #[arg(value_enum)]
        permission: PermissionArg,
    },

    /// Replace a method body from a file (`-` reads stdin)
    SetCode { method: String, file: PathBuf },

    /// Append an argument (defaults to `arg: string`)
    ArgAdd {
        method: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type")]
        arg_type: Option<ArgType>,
    },

    /// Change an argument's name or type
    ArgSet {
        method: String,
        index: usize,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type")]
        arg_type: Option<ArgType>,
    },

    /// Remove an argument
    ArgRemove { method: String, index: usize },

    /// Set the UBUS object name (empty restores the default)
    Object { name: String },

    /// Set the ACL name and, optionally, its description
    Acl {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// List sessions, newest first
    List,
    /// Make a session active
    Switch { id: String },
    /// Enter draft state; the next chat message starts a session
    New,
    /// Print a session's messages (defaults to the active session)
    Show { id: Option<String> },
}

/// Method id by name, falling back to a numeric id
fn resolve(document: &DocumentModel, key: &str) -> Result<u32> {
    if let Some(method) = document.find_by_name(key) {
        return Ok(method.id);
    }
    key.parse::<u32>()
        .ok()
        .filter(|id| document.method(*id).is_some())
        .ok_or_else(|| anyhow!("Method \"{}\" not found.", key))
}

fn print_methods(document: &DocumentModel) {
    for method in document.methods() {
        let marker = if document.selected_id() == Some(method.id) { "*" } else { " " };
        let label = document.label(method.id).unwrap_or_else(|| method.name.clone());
        let args: Vec<_> = method
            .args
            .iter()
            .map(|a| format!("{}:{}", a.name, a.arg_type))
            .collect();
        println!(
            "{} {:>3}  {:<24} {:?}/{:?}  ({})",
            marker,
            method.id,
            label,
            method.mode,
            method.acl,
            args.join(", ")
        );
    }
}

fn warn_on_name(document: &DocumentModel, id: u32) {
    if let Some(message) = document.validation(id).and_then(|v| v.error_message()) {
        eprintln!("{}", message);
    }
}

/// Apply one document command. Returns whether the workspace changed.
pub async fn run(state: &AppState, command: DocumentCommand) -> Result<bool> {
    let mut document = state.document.write().await;

    match command {
        DocumentCommand::Methods => {
            let meta = document.meta();
            println!("object: {}  acl: {} ({})", meta.object_name, meta.acl_name, meta.acl_description);
            print_methods(&document);
            return Ok(false);
        }
        DocumentCommand::Show { method } => {
            let id = match method {
                Some(key) => resolve(&document, &key)?,
                None => document
                    .selected_id()
                    .ok_or_else(|| anyhow!("No method is selected."))?,
            };
            if let Some(method) = document.method(id) {
                println!("{}", method.code);
            }
            return Ok(false);
        }
        DocumentCommand::Add { name } => {
            let id = document.add_method();
            if let Some(name) = name {
                document.update_method_field(id, MethodUpdate::Name(name))?;
                warn_on_name(&document, id);
            }
            if let Some(label) = document.label(id) {
                println!("Added new method: {}", label);
            }
        }
        DocumentCommand::Delete { method } => {
            let id = resolve(&document, &method)?;
            let removed = document.delete_method(id)?;
            println!("Deleted method: {}", removed.name);
        }
        DocumentCommand::Rename { method, new_name } => {
            let id = resolve(&document, &method)?;
            document.update_method_field(id, MethodUpdate::Name(new_name))?;
            warn_on_name(&document, id);
        }
        DocumentCommand::Select { method } => {
            let id = resolve(&document, &method)?;
            document.select(id)?;
        }
        DocumentCommand::SetMode { method, mode } => {
            let id = resolve(&document, &method)?;
            document.update_method_field(id, MethodUpdate::Mode(mode.into()))?;
        }
        DocumentCommand::SetPermission { method, permission } => {
            let id = resolve(&document, &method)?;
            document.update_method_field(id, MethodUpdate::Acl(permission.into()))?;
        }
        DocumentCommand::SetCode { method, file } => {
            let id = resolve(&document, &method)?;
            let code = if file.as_os_str() == "-" {
                let mut code = String::new();
                std::io::stdin().read_to_string(&mut code)?;
                code
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?
            };
            document.update_method_field(id, MethodUpdate::Code(code))?;
        }
        DocumentCommand::ArgAdd { method, name, arg_type } => {
            let id = resolve(&document, &method)?;
            let index = document.add_arg(id)?;
            apply_arg(&mut document, id, index, name, arg_type)?;
        }
        DocumentCommand::ArgSet { method, index, name, arg_type } => {
            let id = resolve(&document, &method)?;
            if name.is_none() && arg_type.is_none() {
                bail!("Nothing to change: pass --name and/or --type");
            }
            apply_arg(&mut document, id, index, name, arg_type)?;
        }
        DocumentCommand::ArgRemove { method, index } => {
            let id = resolve(&document, &method)?;
            let removed = document.remove_arg(id, index)?;
            println!("Removed argument: {}", removed.name);
        }
        DocumentCommand::Object { name } => {
            document.set_object_name(&name);
            println!("Set object name to: {}", document.meta().object_name);
        }
        DocumentCommand::Acl { name, description } => {
            document.set_acl_name(&name);
            if let Some(description) = description {
                document.set_acl_description(description);
            }
            println!("ACL file: {}", document.meta().acl_filename());
        }
    }
    Ok(true)
}

fn apply_arg(
    document: &mut DocumentModel,
    id: u32,
    index: usize,
    name: Option<String>,
    arg_type: Option<ArgType>,
) -> Result<()> {
    if let Some(name) = name {
        document.update_arg(id, index, ArgUpdate::Name(name))?;
    }
    if let Some(arg_type) = arg_type {
        document.update_arg(id, index, ArgUpdate::Type(arg_type))?;
    }
    Ok(())
}

pub async fn print_test_command(state: &AppState, method: Option<&str>) -> Result<()> {
    let document = state.document.read().await;
    let id = match method {
        Some(key) => resolve(&document, key)?,
        None => document
            .selected_id()
            .ok_or_else(|| anyhow!("No method is selected."))?,
    };
    let method = document
        .method(id)
        .ok_or_else(|| anyhow!("Method {} not found.", id))?;
    println!("{}", test_command(document.meta(), method));
    Ok(())
}

pub async fn run_sessions(state: &AppState, command: Option<SessionCommand>) -> Result<bool> {
    let mut sessions = state.sessions.write().await;

    match command.unwrap_or(SessionCommand::List) {
        SessionCommand::List => {
            let active = sessions.active_id().map(str::to_string);
            for session in sessions.list_sessions() {
                let marker = if active.as_deref() == Some(session.id.as_str()) { "*" } else { " " };
                println!(
                    "{} {}  {}  {} ({} messages)",
                    marker,
                    session.id,
                    session.created_at.format("%Y-%m-%d %H:%M"),
                    session.title,
                    session.message_count()
                );
            }
            Ok(false)
        }
        SessionCommand::Switch { id } => {
            sessions.switch_to(&id)?;
            Ok(true)
        }
        SessionCommand::New => {
            sessions.start_draft();
            Ok(true)
        }
        SessionCommand::Show { id } => {
            let session = match id {
                Some(id) => sessions.get(&id),
                None => sessions.active(),
            }
            .ok_or_else(|| anyhow!("No such session."))?;
            println!("# {}", session.title);
            for message in &session.messages {
                println!("{}", render_message(message));
            }
            Ok(false)
        }
    }
}

/// One-line transcript form of a message
pub fn render_message(message: &ChatMessage) -> String {
    match message {
        ChatMessage::User { text } => format!("you> {}", text),
        ChatMessage::ModelText { text } => format!("assistant> {}", text),
        ChatMessage::ModelFunctionCall { name, arguments } => {
            format!("assistant> [call {} {}]", name, arguments)
        }
        ChatMessage::FunctionResult { name, result, success } => {
            let status = if *success { "ok" } else { "failed" };
            format!("tool {} ({})> {}", name, status, result)
        }
    }
}
