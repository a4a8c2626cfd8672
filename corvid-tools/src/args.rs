//! Call arguments as resolved from REPL call syntax.

use crate::error::ToolError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Positional and keyword arguments for one tool call.
///
/// Tools declare their parameter order in their signature string; a
/// parameter may arrive positionally or by keyword, positional winning
/// on conflict (the REPL rejects duplicates before the tool sees them).
#[derive(Debug, Clone, Default)]
pub struct ToolArgs {
    positional: Vec<Value>,
    keywords: BTreeMap<String, Value>,
}

impl ToolArgs {
    /// Build from resolved call parts.
    pub fn new(positional: Vec<Value>, keywords: BTreeMap<String, Value>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    /// Fetch the parameter at `index` / named `name`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keywords.get(name))
    }

    /// A required string parameter.
    pub fn require_str(&self, index: usize, name: &str) -> Result<&str, ToolError> {
        match self.get(index, name) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ToolError::bad_input(
                format!("`{name}` must be a string, got {other}"),
                format!("pass {name} as a quoted string"),
            )),
            None => Err(ToolError::bad_input(
                format!("missing required argument `{name}`"),
                format!("pass `{name}` positionally or as {name}=..."),
            )),
        }
    }

    /// An optional string parameter.
    pub fn opt_str(&self, index: usize, name: &str) -> Result<Option<&str>, ToolError> {
        match self.get(index, name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(ToolError::bad_input(
                format!("`{name}` must be a string, got {other}"),
                format!("pass {name} as a quoted string"),
            )),
        }
    }

    /// An optional non-negative integer parameter with a default.
    pub fn opt_usize(&self, index: usize, name: &str, default: usize) -> Result<usize, ToolError> {
        match self.get(index, name) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| bad_number(name)),
            Some(_) => Err(bad_number(name)),
        }
    }

    /// A required list-of-strings parameter.
    pub fn require_str_list(&self, index: usize, name: &str) -> Result<Vec<String>, ToolError> {
        match self.get(index, name) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(String::from).ok_or_else(|| {
                        ToolError::bad_input(
                            format!("`{name}` must contain only strings"),
                            "pass a list of quoted strings",
                        )
                    })
                })
                .collect(),
            Some(_) | None => Err(ToolError::bad_input(
                format!("missing or non-list argument `{name}`"),
                format!("pass {name} as a list of strings"),
            )),
        }
    }

    /// The required value parameter, any JSON type.
    pub fn require_value(&self, index: usize, name: &str) -> Result<&Value, ToolError> {
        self.get(index, name).ok_or_else(|| {
            ToolError::bad_input(
                format!("missing required argument `{name}`"),
                format!("pass `{name}` positionally or as {name}=..."),
            )
        })
    }
}

fn bad_number(name: &str) -> ToolError {
    ToolError::bad_input(
        format!("`{name}` must be a non-negative integer"),
        format!("pass {name} as a plain number"),
    )
}
