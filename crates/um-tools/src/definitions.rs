//! Tool schemas advertised to the completion service

use serde_json::json;

use um_core::{AssistantSettings, ToolDefinition};

pub const UPDATE_EDITOR_CODE: &str = "update_editor_code";
pub const DEPLOY_TO_ROUTER: &str = "deploy_to_router";
pub const ADD_NEW_METHOD: &str = "add_new_method";
pub const SET_OBJECT_NAME: &str = "set_object_name";
pub const RENAME_METHOD: &str = "rename_method";
pub const CONNECT_SSH: &str = "connect_ssh";

pub const TOOL_NAMES: &[&str] = &[
    UPDATE_EDITOR_CODE,
    DEPLOY_TO_ROUTER,
    ADD_NEW_METHOD,
    SET_OBJECT_NAME,
    RENAME_METHOD,
    CONNECT_SSH,
];

fn tool(name: &str, description: &str, parameters: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// Every tool, in catalogue order
pub fn all_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            UPDATE_EDITOR_CODE,
            "Updates the main code editor with the provided Lua script. Use this tool when you generate or modify Lua code for the user.",
            json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The complete Lua source code to write to the editor."
                    }
                },
                "required": ["code"]
            }),
        ),
        tool(
            DEPLOY_TO_ROUTER,
            "Deploys (uploads) the current script and ACL to the configured OpenWrt router over SSH and restarts RPCD.",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
        tool(
            ADD_NEW_METHOD,
            "Adds a new UBUS method to the list. Use this when the user wants to create a new functionality.",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The name of the new method (optional)."
                    }
                }
            }),
        ),
        tool(
            SET_OBJECT_NAME,
            "Sets the UBUS object name (namespace).",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The new object name."
                    }
                },
                "required": ["name"]
            }),
        ),
        tool(
            RENAME_METHOD,
            "Renames an existing UBUS method.",
            json!({
                "type": "object",
                "properties": {
                    "old_name": {
                        "type": "string",
                        "description": "The current name of the method to rename."
                    },
                    "new_name": {
                        "type": "string",
                        "description": "The new name for the method."
                    }
                },
                "required": ["old_name", "new_name"]
            }),
        ),
        tool(
            CONNECT_SSH,
            "Initiates an SSH connection to the router using the saved credentials.",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
    ]
}

/// Tools not switched off in the assistant settings
pub fn enabled_tools(settings: &AssistantSettings) -> Vec<ToolDefinition> {
    all_tools()
        .into_iter()
        .filter(|t| settings.is_tool_enabled(&t.name))
        .collect()
}
