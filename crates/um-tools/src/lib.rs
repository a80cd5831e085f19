//! um-tools: assistant tools
//!
//! The closed set of six tools the assistant may call, their schemas, and the
//! dispatcher that applies a call to the document or hands it to a collaborator.

pub mod definitions;
pub mod dispatcher;
pub mod error;
pub mod invocation;

pub use definitions::{all_tools, enabled_tools, TOOL_NAMES};
pub use dispatcher::ToolDispatcher;
pub use error::DispatchError;
pub use invocation::ToolInvocation;
