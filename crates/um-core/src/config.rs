//! Environment Configuration Loader
//!
//! Loads environment variables from the canonical location: `/etc/ubus-maker/environment`
//! and builds the router connection and assistant settings from them.
//!
//! ## Usage
//!
//! Call `load_environment()` early in main() before accessing any config:
//!
//! ```rust
//! use um_core::config::{load_environment, ConnectionSettings};
//!
//! fn main() {
//!     load_environment();
//!     let connection = ConnectionSettings::from_env();
//!     println!("deploying to {}", connection.host);
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default path for the environment file
pub const DEFAULT_ENV_FILE: &str = "/etc/ubus-maker/environment";

/// Alternative paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &["/etc/ubus-maker/environment", "/etc/ubus-maker.env", ".env"];

pub const DEFAULT_ROUTER_HOST: &str = "192.168.1.1";
pub const DEFAULT_ROUTER_USER: &str = "root";
pub const DEFAULT_SCRIPT_PATH: &str = "/usr/libexec/rpcd/";
pub const DEFAULT_ACL_PATH: &str = "/usr/share/rpcd/acl.d/";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// System message sent with every assistant turn unless overridden
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are an expert developer for OpenWrt, Lua and the UBUS micro bus.
Help the user write correct, efficient and secure Lua bodies for UBUS methods served by rpcd.

Context:
1. Scripts run on OpenWrt routers with a Lua 5.1 compatible interpreter.
2. Available libraries: `luci.jsonc` (JSON), `luci.model.uci` (UCI configuration), `nixio.fs` (file system), `luci.sys` (system calls), `ubus` (other UBUS objects).
3. The user edits the body of one UBUS method.
   - Auto mode (default): a `response` table is predefined. Assign fields on it and do not return anything; the wrapper serializes it.
   - Manual mode: the body owns the whole function and must return a table with a `result` field.
4. Validate every input. Never pass unchecked input to `os.execute`.
5. When asked for code, answer with only the Lua body unless the whole file is requested.

Keep answers concise and technical.";

/// Load environment variables from the canonical configuration file.
///
/// This function:
/// 1. Honours `UM_ENV_FILE` when set
/// 2. Checks `/etc/ubus-maker/environment`, then the per-user config dir
/// 3. Falls back to `.env` in current directory (development)
/// 4. Does NOT override existing environment variables
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("UM_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    let mut candidates: Vec<String> = ENV_FILE_PATHS.iter().map(|p| p.to_string()).collect();
    if let Some(user_file) = user_env_file() {
        candidates.insert(1, user_file.to_string_lossy().into_owned());
    }

    for path in &candidates {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn user_env_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ubus-maker").join("environment"))
}

/// Try to load an environment file from the given path.
fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for line in content.lines() {
                let line = line.trim();

                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded_count += 1;
                        debug!("Loaded: {}={}", key, if is_secret_key(&key) { "***" } else { &value });
                    } else {
                        skipped_count += 1;
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );

            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

fn is_secret_key(key: &str) -> bool {
    key.contains("KEY") || key.contains("TOKEN") || key.contains("SECRET") || key.contains("PASSWORD")
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    // Handle: KEY=VALUE, KEY="VALUE", KEY='VALUE'
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

/// Get an integer configuration value.
pub fn get_config_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Location of the persisted workspace (methods, meta, chat sessions).
pub fn state_file_path() -> PathBuf {
    if let Some(path) = get_config_opt("UM_STATE_FILE") {
        return PathBuf::from(path);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ubus-maker")
        .join("state.json")
}

/// Saved router connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    pub host: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub script_path: String,
    pub acl_path: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_ROUTER_HOST.to_string(),
            username: DEFAULT_ROUTER_USER.to_string(),
            password: String::new(),
            script_path: DEFAULT_SCRIPT_PATH.to_string(),
            acl_path: DEFAULT_ACL_PATH.to_string(),
        }
    }
}

impl ConnectionSettings {
    /// Build from `UM_ROUTER_*` / `UM_*_PATH` variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: get_config("UM_ROUTER_HOST", DEFAULT_ROUTER_HOST),
            username: get_config("UM_ROUTER_USER", DEFAULT_ROUTER_USER),
            password: get_config("UM_ROUTER_PASSWORD", ""),
            script_path: get_config("UM_SCRIPT_PATH", DEFAULT_SCRIPT_PATH),
            acl_path: get_config("UM_ACL_PATH", DEFAULT_ACL_PATH),
        }
    }

    /// Host and username must both be present before anything touches the network.
    pub fn require_target(&self) -> Result<()> {
        if self.host.trim().is_empty() || self.username.trim().is_empty() {
            return Err(Error::configuration(
                "Host IP and Username are required in Settings to connect.",
            ));
        }
        Ok(())
    }

    /// `user@host`, used in status messages
    pub fn target(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

/// Settings for the assistant and its completion service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantSettings {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub system_message: String,
    #[serde(default)]
    pub disabled_tools: Vec<String>,
    pub max_tool_rounds: usize,
    pub request_timeout_secs: u64,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            disabled_tools: Vec::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl AssistantSettings {
    pub fn from_env() -> Self {
        let api_key = get_config_opt("GEMINI_API_KEY").or_else(|| get_config_opt("GOOGLE_API_KEY"));
        let disabled_tools = get_config_opt("UM_DISABLED_TOOLS")
            .map(|raw| {
                raw.split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            api_key,
            model: get_config("UM_GEMINI_MODEL", DEFAULT_MODEL),
            system_message: get_config_opt("UM_SYSTEM_MESSAGE")
                .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string()),
            disabled_tools,
            max_tool_rounds: get_config_int("UM_MAX_TOOL_ROUNDS", DEFAULT_MAX_TOOL_ROUNDS as i64).max(1) as usize,
            request_timeout_secs: get_config_int(
                "UM_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS as i64,
            )
            .max(1) as u64,
        }
    }

    /// Tools are enabled unless listed in `disabled_tools`.
    pub fn is_tool_enabled(&self, name: &str) -> bool {
        !self.disabled_tools.iter().any(|disabled| disabled == name)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
