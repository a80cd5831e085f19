//! Lua script, ACL policy and test command generation
//!
//! Everything here is a pure function of the methods and the document meta:
//! no timestamps, no random ids, and only ordered containers, so the same
//! document always yields byte-identical output.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{DocumentError, Result};
use crate::model::{AclPermission, DocumentMeta, Method, MethodMode};

const SCRIPT_HEADER: &str = r#"#!/usr/bin/env lua

local jsonc = require("luci.jsonc")

local methods = {
"#;

// `list` prints each method's argument shape, `call` validates stdin JSON
// against it, drops the rpcd session key and runs the method.
const SCRIPT_FOOTER: &str = r#"
}

local function parseInput()

    local parse = jsonc.new()
    local done, err

    while true do
        local chunk = io.read(4096)
        if not chunk then
            break
        elseif not done and not err then
            done, err = parse:parse(chunk)
        end
    end

    if not done then
        print(jsonc.stringify({
            error = err or "Incomplete input for argument parsing"
        }))
        os.exit(1)
    end

    return parse:get()
end

local function validateArgs(func, uargs)

    local method = methods[func]
    if not method then
        print(jsonc.stringify({error = "Method not found in methods table"}))
        os.exit(1)
    end

    local n = 0
    for _, _ in pairs(uargs) do n = n + 1 end

    if method.args and n == 0 then
        print(jsonc.stringify({
            error = "Received empty arguments for " .. func ..
                " but it requires " .. jsonc.stringify(method.args)
        }))
        os.exit(1)
    end

    uargs.ubus_rpc_session = nil

    local margs = method.args or {}
    for k, v in pairs(uargs) do
        if margs[k] == nil or (v ~= nil and type(v) ~= type(margs[k])) then
            print(jsonc.stringify({
                error = "Invalid argument '" .. k .. "' for " .. func ..
                    " it requires " .. jsonc.stringify(method.args)
            }))
            os.exit(1)
        end
    end

    return method
end

if arg[1] == "list" then
    local _, rv = nil, {}
    for _, method in pairs(methods) do rv[_] = method.args or {} end
    print((jsonc.stringify(rv):gsub(":%[%]", ":{}")))
elseif arg[1] == "call" then
    local args = parseInput()
    local method = validateArgs(arg[2], args)
    local run = method.call(args)
    print(run.result)
    os.exit(run.code or 0)
end
"#;

const BODY_INDENT: &str = "            ";

/// A generated file ready to be written or uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub filename: String,
    pub content: String,
}

/// Both deployable artifacts for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    pub script: GeneratedFile,
    pub acl_policy: GeneratedFile,
}

/// Generate the rpcd Lua script and the ACL policy for `methods` in order.
pub fn generate_artifacts(methods: &[Method], meta: &DocumentMeta) -> Result<Artifacts> {
    Ok(Artifacts {
        script: GeneratedFile {
            filename: meta.script_filename().to_string(),
            content: generate_script(methods),
        },
        acl_policy: GeneratedFile {
            filename: meta.acl_filename(),
            content: generate_acl_policy(methods, meta)?,
        },
    })
}

pub fn generate_script(methods: &[Method]) -> String {
    let mut script = String::from(SCRIPT_HEADER);
    for (idx, method) in methods.iter().enumerate() {
        script.push_str("    ");
        script.push_str(&method.name);
        script.push_str(" = {");
        script.push_str(&args_block(method));
        script.push_str("\n        call = function(args)\n");
        script.push_str(&call_body(method));
        script.push_str("\n        end\n    }");
        if idx + 1 < methods.len() {
            script.push(',');
        }
        script.push('\n');
    }
    script.push_str(SCRIPT_FOOTER);
    script
}

fn args_block(method: &Method) -> String {
    if method.args.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = method
        .args
        .iter()
        .map(|arg| format!("{}{} = {}", BODY_INDENT, arg.name, arg.arg_type.lua_example()))
        .collect();
    format!("\n        args = {{\n{}\n        }},", lines.join(",\n"))
}

fn indent_body(code: &str) -> String {
    code.split('\n')
        .map(|line| format!("{}{}", BODY_INDENT, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn call_body(method: &Method) -> String {
    match method.mode {
        MethodMode::Auto => format!(
            "{indent}local response = {{}}\n{body}\n{indent}local r = {{}}\n{indent}r.result = jsonc.stringify(response, false)\n{indent}return r",
            indent = BODY_INDENT,
            body = indent_body(&method.code)
        ),
        MethodMode::Manual => indent_body(&method.code),
    }
}

#[derive(Serialize)]
struct AclEntry<'a> {
    description: &'a str,
    read: UbusGrant<'a>,
    write: UbusGrant<'a>,
}

#[derive(Serialize)]
struct UbusGrant<'a> {
    ubus: BTreeMap<&'a str, Vec<&'a str>>,
}

impl<'a> UbusGrant<'a> {
    fn new(object: &'a str, methods: &'a [Method], acl: AclPermission) -> Self {
        let names = methods
            .iter()
            .filter(|m| m.acl == acl)
            .map(|m| m.name.as_str())
            .collect();
        let mut ubus = BTreeMap::new();
        ubus.insert(object, names);
        Self { ubus }
    }
}

/// ACL policy JSON, pretty-printed with four-space indentation
pub fn generate_acl_policy(methods: &[Method], meta: &DocumentMeta) -> Result<String> {
    let entry = AclEntry {
        description: &meta.acl_description,
        read: UbusGrant::new(&meta.object_name, methods, AclPermission::Read),
        write: UbusGrant::new(&meta.object_name, methods, AclPermission::Write),
    };
    let mut policy = BTreeMap::new();
    policy.insert(meta.acl_name.as_str(), entry);

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    policy
        .serialize(&mut serializer)
        .map_err(|e| DocumentError::Render(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| DocumentError::Render(e.to_string()))
}

/// `ubus call <object> <method> '<json>'` with example values in argument order
pub fn test_command(meta: &DocumentMeta, method: &Method) -> String {
    // A repeated argument name keeps its first position, like a JS object literal
    let mut entries: Vec<(&str, Value)> = Vec::new();
    for arg in &method.args {
        let value = arg.arg_type.json_example();
        match entries.iter_mut().find(|(name, _)| *name == arg.name) {
            Some(existing) => existing.1 = value,
            None => entries.push((arg.name.as_str(), value)),
        }
    }
    let payload = entries
        .iter()
        .map(|(name, value)| format!("{}:{}", Value::String(name.to_string()), value))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "ubus call {} {} '{{{}}}'",
        meta.object_name, method.name, payload
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArgType, DocumentModel, MethodArg};
    use serde_json::json;

    fn sample_a() -> Method {
        Method {
            id: 1,
            name: "sampleA".to_string(),
            args: Vec::new(),
            mode: MethodMode::Auto,
            acl: AclPermission::Read,
            code: r#"response.contents = "Hello""#.to_string(),
        }
    }

    #[test]
    fn test_acl_for_single_read_method() {
        let meta = DocumentMeta::new("my_server", "sample");
        let acl = generate_acl_policy(&[sample_a()], &meta).unwrap();
        let parsed: Value = serde_json::from_str(&acl).unwrap();
        assert_eq!(
            parsed,
            json!({"sample":{"description":"","read":{"ubus":{"my_server":["sampleA"]}},"write":{"ubus":{"my_server":[]}}}})
        );
    }

    #[test]
    fn test_acl_layout_is_four_space_pretty() {
        let meta = DocumentMeta::new("my_server", "sample");
        let acl = generate_acl_policy(&[sample_a()], &meta).unwrap();
        let expected = r#"{
    "sample": {
        "description": "",
        "read": {
            "ubus": {
                "my_server": [
                    "sampleA"
                ]
            }
        },
        "write": {
            "ubus": {
                "my_server": []
            }
        }
    }
}"#;
        assert_eq!(acl, expected);
    }

    #[test]
    fn test_acl_lists_duplicates_in_order() {
        let mut second = sample_a();
        second.id = 2;
        let mut writer = sample_a();
        writer.id = 3;
        writer.name = "apply".to_string();
        writer.acl = AclPermission::Write;

        let meta = DocumentMeta::new("obj", "acl");
        let acl = generate_acl_policy(&[sample_a(), writer, second], &meta).unwrap();
        let parsed: Value = serde_json::from_str(&acl).unwrap();
        assert_eq!(parsed["acl"]["read"]["ubus"]["obj"], json!(["sampleA", "sampleA"]));
        assert_eq!(parsed["acl"]["write"]["ubus"]["obj"], json!(["apply"]));
    }

    #[test]
    fn test_auto_method_entry() {
        let script = generate_script(&[sample_a()]);
        let expected_entry = r#"    sampleA = {
        call = function(args)
            local response = {}
            response.contents = "Hello"
            local r = {}
            r.result = jsonc.stringify(response, false)
            return r
        end
    }
"#;
        assert!(script.starts_with(SCRIPT_HEADER));
        assert!(script.ends_with(SCRIPT_FOOTER));
        let entries = &script[SCRIPT_HEADER.len()..script.len() - SCRIPT_FOOTER.len()];
        assert_eq!(entries, expected_entry);
    }

    #[test]
    fn test_args_block_and_separators() {
        let mut method = sample_a();
        method.args = vec![
            MethodArg::new("count", ArgType::Number),
            MethodArg::new("flag", ArgType::Boolean),
            MethodArg::new("opts", ArgType::Table),
            MethodArg::new("label", ArgType::String),
        ];
        method.mode = MethodMode::Manual;
        method.code = "return { result = \"{}\" }".to_string();
        let mut other = sample_a();
        other.id = 2;
        other.name = "second".to_string();

        let script = generate_script(&[method, other]);
        assert!(script.contains(
            "    sampleA = {\n        args = {\n            count = 123,\n            flag = true,\n            opts = {},\n            label = \"a_string\"\n        },\n        call = function(args)\n            return { result = \"{}\" }\n        end\n    },\n    second = {"
        ));
        assert!(script.contains("        end\n    }\n\n}\n\nlocal function parseInput()"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let mut doc = DocumentModel::new();
        let id = doc.add_method();
        doc.add_arg(id).unwrap();
        let first = generate_artifacts(doc.methods(), doc.meta()).unwrap();
        for _ in 0..5 {
            let again = generate_artifacts(doc.methods(), doc.meta()).unwrap();
            assert_eq!(again, first);
        }
        assert_eq!(first.script.filename, "my_server");
        assert_eq!(first.acl_policy.filename, "sample.json");
    }

    #[test]
    fn test_command_uses_val_for_strings() {
        let doc = DocumentModel::new();
        let sample_b = doc.find_by_name("sampleB").unwrap();
        assert_eq!(
            test_command(doc.meta(), sample_b),
            r#"ubus call my_server sampleB '{"data":"val"}'"#
        );
        let sample_a = doc.find_by_name("sampleA").unwrap();
        assert_eq!(test_command(doc.meta(), sample_a), "ubus call my_server sampleA '{}'");
    }

    #[test]
    fn test_command_preserves_arg_order() {
        let mut method = sample_a();
        method.args = vec![
            MethodArg::new("zeta", ArgType::Table),
            MethodArg::new("alpha", ArgType::Number),
            MethodArg::new("zeta", ArgType::Boolean),
        ];
        let meta = DocumentMeta::new("obj", "acl");
        assert_eq!(
            test_command(&meta, &method),
            r#"ubus call obj sampleA '{"zeta":true,"alpha":123}'"#
        );
    }
}
