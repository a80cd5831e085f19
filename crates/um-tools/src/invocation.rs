//! Typed tool calls
//!
//! Arguments are read leniently: a missing or non-string value is treated as
//! absent, never as a parse failure. Only an unknown tool name is rejected.

use um_core::FunctionCall;

use crate::definitions::{
    ADD_NEW_METHOD, CONNECT_SSH, DEPLOY_TO_ROUTER, RENAME_METHOD, SET_OBJECT_NAME,
    UPDATE_EDITOR_CODE,
};
use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    UpdateEditorCode { code: Option<String> },
    DeployToRouter,
    AddNewMethod { name: Option<String> },
    SetObjectName { name: Option<String> },
    RenameMethod {
        old_name: Option<String>,
        new_name: Option<String>,
    },
    ConnectSsh,
}

impl ToolInvocation {
    pub fn from_call(call: &FunctionCall) -> Result<Self, DispatchError> {
        let arg = |key: &str| call.str_arg(key).map(str::to_string);
        let non_empty = |key: &str| arg(key).filter(|v| !v.is_empty());

        match call.name.as_str() {
            UPDATE_EDITOR_CODE => Ok(Self::UpdateEditorCode {
                code: non_empty("code"),
            }),
            DEPLOY_TO_ROUTER => Ok(Self::DeployToRouter),
            ADD_NEW_METHOD => Ok(Self::AddNewMethod {
                name: non_empty("name"),
            }),
            SET_OBJECT_NAME => Ok(Self::SetObjectName {
                name: non_empty("name"),
            }),
            RENAME_METHOD => Ok(Self::RenameMethod {
                old_name: arg("old_name"),
                new_name: non_empty("new_name"),
            }),
            CONNECT_SSH => Ok(Self::ConnectSsh),
            other => Err(DispatchError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateEditorCode { .. } => UPDATE_EDITOR_CODE,
            Self::DeployToRouter => DEPLOY_TO_ROUTER,
            Self::AddNewMethod { .. } => ADD_NEW_METHOD,
            Self::SetObjectName { .. } => SET_OBJECT_NAME,
            Self::RenameMethod { .. } => RENAME_METHOD,
            Self::ConnectSsh => CONNECT_SSH,
        }
    }
}
