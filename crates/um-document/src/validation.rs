//! Method name validation
//!
//! Names are never rejected on edit. The flags computed here only drive labels
//! and inline error text.

use regex::Regex;
use std::sync::OnceLock;

use crate::model::Method;

fn name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Whether `name` is a usable Lua/UBUS identifier
pub fn is_valid_format(name: &str) -> bool {
    name_pattern().is_some_and(|re| re.is_match(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameValidation {
    pub format_valid: bool,
    pub unique: bool,
}

impl NameValidation {
    pub fn is_valid(&self) -> bool {
        self.format_valid && self.unique
    }

    /// Name with a ` (Invalid)` / ` (Duplicate)` marker appended when flagged
    pub fn label(&self, name: &str) -> String {
        if !self.format_valid {
            format!("{} (Invalid)", name)
        } else if !self.unique {
            format!("{} (Duplicate)", name)
        } else {
            name.to_string()
        }
    }

    pub fn error_message(&self) -> Option<&'static str> {
        if !self.format_valid {
            Some("Invalid name: Use letters, numbers, and underscores (start with a letter).")
        } else if !self.unique {
            Some("Error: Method name already exists.")
        } else {
            None
        }
    }
}

/// Flags for `name` as if held by method `id` among `methods`
pub fn validate_name(name: &str, id: u32, methods: &[Method]) -> NameValidation {
    NameValidation {
        format_valid: is_valid_format(name),
        unique: !methods.iter().any(|m| m.name == name && m.id != id),
    }
}
