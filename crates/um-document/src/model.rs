//! Method definitions and the document that owns them

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DocumentError, Result};
use crate::validation::{self, NameValidation};

pub const DEFAULT_OBJECT_NAME: &str = "my_server";
pub const DEFAULT_ACL_NAME: &str = "sample";
pub const DEFAULT_ACL_DESCRIPTION: &str = "Sample ubus method";
const NEW_METHOD_PREFIX: &str = "new_method";
const NEW_METHOD_CODE: &str = r#"response.contents = "New Method""#;

/// Declared type of a method argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    #[default]
    String,
    Number,
    Boolean,
    Table,
}

impl ArgType {
    /// Example literal used in the generated script's `args` table
    pub fn lua_example(&self) -> &'static str {
        match self {
            ArgType::Number => "123",
            ArgType::Boolean => "true",
            ArgType::Table => "{}",
            ArgType::String => "\"a_string\"",
        }
    }

    /// Example value used in the `ubus call` test command
    pub fn json_example(&self) -> serde_json::Value {
        match self {
            ArgType::Number => serde_json::json!(123),
            ArgType::Boolean => serde_json::json!(true),
            ArgType::Table => serde_json::json!({}),
            ArgType::String => serde_json::json!("val"),
        }
    }
}

impl std::fmt::Display for ArgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgType::String => write!(f, "string"),
            ArgType::Number => write!(f, "number"),
            ArgType::Boolean => write!(f, "boolean"),
            ArgType::Table => write!(f, "table"),
        }
    }
}

impl std::str::FromStr for ArgType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(ArgType::String),
            "number" => Ok(ArgType::Number),
            "boolean" => Ok(ArgType::Boolean),
            "table" => Ok(ArgType::Table),
            other => Err(format!("unknown argument type '{}'", other)),
        }
    }
}

/// Who builds the method's return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MethodMode {
    /// Body fills an implicit `response` table, the wrapper serializes it
    #[default]
    Auto,
    /// Body returns `{ result = ... }` itself
    Manual,
}

/// ACL bucket a method is listed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AclPermission {
    #[default]
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodArg {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
}

impl MethodArg {
    pub fn new(name: impl Into<String>, arg_type: ArgType) -> Self {
        Self {
            name: name.into(),
            arg_type,
        }
    }
}

/// One UBUS RPC method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub args: Vec<MethodArg>,
    #[serde(default)]
    pub mode: MethodMode,
    #[serde(default)]
    pub acl: AclPermission,
    #[serde(default)]
    pub code: String,
}

impl Method {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            args: Vec::new(),
            mode: MethodMode::Auto,
            acl: AclPermission::Read,
            code: String::new(),
        }
    }
}

/// Object and ACL naming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub object_name: String,
    pub acl_name: String,
    #[serde(default)]
    pub acl_description: String,
}

impl DocumentMeta {
    pub fn new(object_name: impl Into<String>, acl_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            acl_name: acl_name.into(),
            acl_description: String::new(),
        }
    }

    /// Script file name on the router
    pub fn script_filename(&self) -> &str {
        &self.object_name
    }

    pub fn acl_filename(&self) -> String {
        format!("{}.json", self.acl_name)
    }
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self {
            object_name: DEFAULT_OBJECT_NAME.to_string(),
            acl_name: DEFAULT_ACL_NAME.to_string(),
            acl_description: DEFAULT_ACL_DESCRIPTION.to_string(),
        }
    }
}

/// Field update for [`DocumentModel::update_method_field`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodUpdate {
    Name(String),
    Mode(MethodMode),
    Acl(AclPermission),
    Code(String),
}

/// Field update for [`DocumentModel::update_arg`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgUpdate {
    Name(String),
    Type(ArgType),
}

/// The authoring document: methods in insertion order, naming, and the selected method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentModel {
    methods: Vec<Method>,
    meta: DocumentMeta,
    #[serde(default)]
    selected: Option<u32>,
    /// Highest id ever handed out, so deleted ids are not reused
    #[serde(default)]
    last_id: u32,
}

impl Default for DocumentModel {
    fn default() -> Self {
        let methods = default_methods();
        let last_id = methods.iter().map(|m| m.id).max().unwrap_or(0);
        Self {
            selected: methods.first().map(|m| m.id),
            methods,
            meta: DocumentMeta::default(),
            last_id,
        }
    }
}

impl DocumentModel {
    /// Document with the three sample methods and default naming
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(methods: Vec<Method>, meta: DocumentMeta) -> Self {
        let last_id = methods.iter().map(|m| m.id).max().unwrap_or(0);
        Self {
            selected: methods.first().map(|m| m.id),
            methods,
            meta,
            last_id,
        }
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    pub fn method(&self, id: u32) -> Option<&Method> {
        self.methods.iter().find(|m| m.id == id)
    }

    fn method_mut(&mut self, id: u32) -> Result<&mut Method> {
        self.methods
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(DocumentError::MethodNotFound(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Append a fresh method and select it. Returns its id.
    pub fn add_method(&mut self) -> u32 {
        let max_existing = self.methods.iter().map(|m| m.id).max().unwrap_or(0);
        let id = max_existing.max(self.last_id) + 1;
        self.last_id = id;

        let mut suffix = id;
        let mut name = format!("{}_{}", NEW_METHOD_PREFIX, suffix);
        while self.find_by_name(&name).is_some() {
            suffix += 1;
            name = format!("{}_{}", NEW_METHOD_PREFIX, suffix);
        }

        debug!(id, name = %name, "Adding method");
        let mut method = Method::new(id, name);
        method.code = NEW_METHOD_CODE.to_string();
        self.methods.push(method);
        self.selected = Some(id);
        id
    }

    /// Remove a method. Deleting the selected method selects the first remaining one.
    pub fn delete_method(&mut self, id: u32) -> Result<Method> {
        let index = self
            .methods
            .iter()
            .position(|m| m.id == id)
            .ok_or(DocumentError::MethodNotFound(id))?;
        let removed = self.methods.remove(index);
        if self.selected == Some(id) || self.selected.is_none() {
            self.selected = self.methods.first().map(|m| m.id);
        }
        debug!(id, name = %removed.name, "Deleted method");
        Ok(removed)
    }

    /// Apply a single field update.
    ///
    /// Moving a method from auto to manual rewrites its body so the former
    /// `response` handling is spelled out inline. Any other mode change,
    /// including manual back to auto, leaves the body untouched.
    pub fn update_method_field(&mut self, id: u32, update: MethodUpdate) -> Result<()> {
        let method = self.method_mut(id)?;
        match update {
            MethodUpdate::Name(name) => method.name = name,
            MethodUpdate::Mode(mode) => {
                if method.mode == MethodMode::Auto && mode == MethodMode::Manual {
                    method.code = manual_body(&method.code);
                }
                method.mode = mode;
            }
            MethodUpdate::Acl(acl) => method.acl = acl,
            MethodUpdate::Code(code) => method.code = code,
        }
        Ok(())
    }

    /// Append a `string` argument named `arg`. Returns its index.
    pub fn add_arg(&mut self, id: u32) -> Result<usize> {
        let method = self.method_mut(id)?;
        method.args.push(MethodArg::new("arg", ArgType::String));
        Ok(method.args.len() - 1)
    }

    pub fn update_arg(&mut self, id: u32, index: usize, update: ArgUpdate) -> Result<()> {
        let method = self.method_mut(id)?;
        let arg = method
            .args
            .get_mut(index)
            .ok_or(DocumentError::ArgNotFound { method: id, index })?;
        match update {
            ArgUpdate::Name(name) => arg.name = name,
            ArgUpdate::Type(arg_type) => arg.arg_type = arg_type,
        }
        Ok(())
    }

    pub fn remove_arg(&mut self, id: u32, index: usize) -> Result<MethodArg> {
        let method = self.method_mut(id)?;
        if index >= method.args.len() {
            return Err(DocumentError::ArgNotFound { method: id, index });
        }
        Ok(method.args.remove(index))
    }

    /// Set the UBUS object name; blank input restores the default.
    pub fn set_object_name(&mut self, name: &str) {
        let name = name.trim();
        self.meta.object_name = if name.is_empty() {
            DEFAULT_OBJECT_NAME.to_string()
        } else {
            name.to_string()
        };
    }

    /// Set the ACL name; blank input restores the default.
    pub fn set_acl_name(&mut self, name: &str) {
        let name = name.trim();
        self.meta.acl_name = if name.is_empty() {
            DEFAULT_ACL_NAME.to_string()
        } else {
            name.to_string()
        };
    }

    pub fn set_acl_description(&mut self, description: impl Into<String>) {
        self.meta.acl_description = description.into();
    }

    pub fn select(&mut self, id: u32) -> Result<()> {
        if self.method(id).is_none() {
            return Err(DocumentError::MethodNotFound(id));
        }
        self.selected = Some(id);
        Ok(())
    }

    pub fn selected_id(&self) -> Option<u32> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Method> {
        self.selected.and_then(|id| self.method(id))
    }

    /// Format and uniqueness flags for one method
    pub fn validation(&self, id: u32) -> Option<NameValidation> {
        self.method(id)
            .map(|m| validation::validate_name(&m.name, m.id, &self.methods))
    }

    /// Display label for one method, e.g. `foo (Duplicate)`
    pub fn label(&self, id: u32) -> Option<String> {
        let method = self.method(id)?;
        self.validation(id).map(|v| v.label(&method.name))
    }

    /// Restore the three sample methods and default naming.
    ///
    /// Chat sessions are cleared by the application state alongside this call.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Inline the auto-mode wrapper into a body so it can run as a manual body
fn manual_body(auto_code: &str) -> String {
    format!(
        "local r = {{}}\nlocal response = {{}}\n{}\nr.result = jsonc.stringify(response, false)\nreturn r",
        auto_code
    )
}

fn default_methods() -> Vec<Method> {
    vec![
        Method {
            id: 1,
            name: "sampleA".to_string(),
            args: Vec::new(),
            mode: MethodMode::Auto,
            acl: AclPermission::Read,
            code: r#"response.contents = "Hello""#.to_string(),
        },
        Method {
            id: 2,
            name: "sampleB".to_string(),
            args: vec![MethodArg::new("data", ArgType::String)],
            mode: MethodMode::Auto,
            acl: AclPermission::Read,
            code: r#"response.contents = "Your Input Data: " .. args.data"#.to_string(),
        },
        Method {
            id: 3,
            name: "sampleC".to_string(),
            args: vec![MethodArg::new("hostname", ArgType::String)],
            mode: MethodMode::Auto,
            acl: AclPermission::Write,
            code: [
                r#"local uci = require("luci.model.uci").cursor()"#,
                r#"uci:set("system", "@system[0]", "hostname", args.hostname)"#,
                r#"uci:commit("system")"#,
                r#"response.contents = "OK""#,
            ]
            .join("\n"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_document() {
        let doc = DocumentModel::new();
        let names: Vec<_> = doc.methods().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["sampleA", "sampleB", "sampleC"]);
        assert_eq!(doc.meta().object_name, "my_server");
        assert_eq!(doc.meta().acl_name, "sample");
        assert_eq!(doc.meta().acl_description, "Sample ubus method");
        assert_eq!(doc.selected_id(), Some(1));
    }

    #[test]
    fn test_add_method_allocates_next_id_and_name() {
        let mut doc = DocumentModel::new();
        let id = doc.add_method();
        assert_eq!(id, 4);
        let method = doc.method(id).unwrap();
        assert_eq!(method.name, "new_method_4");
        assert_eq!(method.mode, MethodMode::Auto);
        assert_eq!(method.acl, AclPermission::Read);
        assert!(method.args.is_empty());
        assert_eq!(doc.selected_id(), Some(4));
    }

    #[test]
    fn test_add_method_on_empty_document() {
        let mut doc = DocumentModel::from_parts(Vec::new(), DocumentMeta::default());
        assert_eq!(doc.add_method(), 1);
        assert_eq!(doc.methods()[0].name, "new_method_1");
    }

    #[test]
    fn test_add_method_probes_taken_names() {
        let mut doc = DocumentModel::new();
        doc.update_method_field(1, MethodUpdate::Name("new_method_4".into()))
            .unwrap();
        doc.update_method_field(2, MethodUpdate::Name("new_method_5".into()))
            .unwrap();
        let id = doc.add_method();
        assert_eq!(doc.method(id).unwrap().name, "new_method_6");
    }

    #[test]
    fn test_add_delete_sequences_never_collide() {
        let mut doc = DocumentModel::new();
        let mut issued = HashSet::new();
        for round in 0..20 {
            let id = doc.add_method();
            assert!(issued.insert(id), "id {} reused", id);
            if round % 3 == 0 {
                doc.delete_method(id).unwrap();
            }
            if round % 5 == 0 {
                let first = doc.methods()[0].id;
                doc.delete_method(first).unwrap();
            }
            let names: HashSet<_> = doc.methods().iter().map(|m| m.name.clone()).collect();
            assert_eq!(names.len(), doc.methods().len());
        }
    }

    #[test]
    fn test_delete_selected_selects_first_remaining() {
        let mut doc = DocumentModel::new();
        doc.select(2).unwrap();
        doc.delete_method(2).unwrap();
        assert_eq!(doc.selected_id(), Some(1));

        doc.delete_method(1).unwrap();
        doc.delete_method(3).unwrap();
        assert_eq!(doc.selected_id(), None);
        assert!(doc.selected().is_none());
    }

    #[test]
    fn test_delete_unknown_method() {
        let mut doc = DocumentModel::new();
        assert_eq!(
            doc.delete_method(42).unwrap_err(),
            DocumentError::MethodNotFound(42)
        );
    }

    #[test]
    fn test_auto_to_manual_rewrites_body_once() {
        let mut doc = DocumentModel::new();
        doc.update_method_field(1, MethodUpdate::Mode(MethodMode::Manual))
            .unwrap();
        let expected = "local r = {}\nlocal response = {}\nresponse.contents = \"Hello\"\nr.result = jsonc.stringify(response, false)\nreturn r";
        assert_eq!(doc.method(1).unwrap().code, expected);

        // Already manual: no second wrapper
        doc.update_method_field(1, MethodUpdate::Mode(MethodMode::Manual))
            .unwrap();
        assert_eq!(doc.method(1).unwrap().code, expected);
    }

    #[test]
    fn test_manual_to_auto_keeps_body() {
        let mut doc = DocumentModel::new();
        doc.update_method_field(1, MethodUpdate::Mode(MethodMode::Manual))
            .unwrap();
        let manual = doc.method(1).unwrap().code.clone();

        doc.update_method_field(1, MethodUpdate::Mode(MethodMode::Auto))
            .unwrap();
        assert_eq!(doc.method(1).unwrap().code, manual);
        assert_eq!(doc.method(1).unwrap().mode, MethodMode::Auto);
    }

    #[test]
    fn test_invalid_names_are_representable() {
        let mut doc = DocumentModel::new();
        doc.update_method_field(1, MethodUpdate::Name("9bad name".into()))
            .unwrap();
        doc.update_method_field(3, MethodUpdate::Name("sampleB".into()))
            .unwrap();

        assert_eq!(doc.label(1).unwrap(), "9bad name (Invalid)");
        assert_eq!(doc.label(2).unwrap(), "sampleB (Duplicate)");
        assert_eq!(doc.label(3).unwrap(), "sampleB (Duplicate)");
    }

    #[test]
    fn test_arg_operations() {
        let mut doc = DocumentModel::new();
        let idx = doc.add_arg(1).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(doc.method(1).unwrap().args[0], MethodArg::new("arg", ArgType::String));

        doc.update_arg(1, 0, ArgUpdate::Name("count".into())).unwrap();
        doc.update_arg(1, 0, ArgUpdate::Type(ArgType::Number)).unwrap();
        assert_eq!(doc.method(1).unwrap().args[0], MethodArg::new("count", ArgType::Number));

        assert_eq!(
            doc.update_arg(1, 5, ArgUpdate::Type(ArgType::Table)),
            Err(DocumentError::ArgNotFound { method: 1, index: 5 })
        );

        let removed = doc.remove_arg(1, 0).unwrap();
        assert_eq!(removed.name, "count");
        assert!(doc.method(1).unwrap().args.is_empty());
        assert!(doc.remove_arg(1, 0).is_err());
    }

    #[test]
    fn test_blank_names_fall_back_to_defaults() {
        let mut doc = DocumentModel::new();
        doc.set_object_name("router_info");
        doc.set_acl_name("router-acl");
        assert_eq!(doc.meta().object_name, "router_info");
        assert_eq!(doc.meta().acl_filename(), "router-acl.json");

        doc.set_object_name("  ");
        doc.set_acl_name("");
        assert_eq!(doc.meta().object_name, "my_server");
        assert_eq!(doc.meta().acl_name, "sample");
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut doc = DocumentModel::new();
        doc.add_method();
        doc.delete_method(1).unwrap();
        doc.set_object_name("other");
        doc.set_acl_description("changed");

        doc.reset();
        assert_eq!(doc, DocumentModel::new());
    }

    #[test]
    fn test_arg_type_parse() {
        assert_eq!("table".parse::<ArgType>().unwrap(), ArgType::Table);
        assert!("float".parse::<ArgType>().is_err());
        assert_eq!(ArgType::Boolean.to_string(), "boolean");
    }
}
