//! UBUS method document model for ubus-maker
//!
//! Holds the RPC method definitions plus object/ACL naming, and turns them into
//! the two deployable artifacts: the rpcd Lua script and its ACL policy.
//!
//! # Modules
//!
//! - `model`: Methods, arguments, document meta and their mutations
//! - `validation`: Method name format and uniqueness flags
//! - `generator`: Deterministic Lua script / ACL policy / test command generation

pub mod error;
pub mod generator;
pub mod model;
pub mod validation;

pub use error::{DocumentError, Result};
pub use generator::{generate_artifacts, test_command, Artifacts, GeneratedFile};
pub use model::{
    AclPermission, ArgType, ArgUpdate, DocumentMeta, DocumentModel, Method, MethodArg, MethodMode,
    MethodUpdate,
};
pub use validation::NameValidation;
