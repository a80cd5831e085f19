//! Core types and utilities for ubus-maker
//!
//! # Modules
//!
//! - `config`: Environment file loading and settings
//! - `error`: Error types and Result alias
//! - `types`: Chat history, tool call and tool definition types shared by every crate

pub mod config;
pub mod error;
pub mod types;

// Re-exports
pub use config::{AssistantSettings, ConnectionSettings};
pub use error::{Error, Result};
pub use types::*;
