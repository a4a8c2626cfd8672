//! Tool failures as data.
//!
//! A [`ToolError`] is returned, never raised past the tool boundary: the
//! REPL renders it as the error dict `{"error", "message", "hint"}` so the
//! model can read the failure and adjust.

use serde_json::{json, Value};
use thiserror::Error;

/// The machine-readable failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    /// No candidate matched the input (unknown entity, empty index).
    NotFound,
    /// The input was malformed (bad IRI, bad argument type, bad SPARQL).
    BadInput,
    /// The named result handle does not exist.
    UnknownHandle,
    /// The remote endpoint could not be reached.
    EndpointUnreachable,
    /// The remote endpoint timed out.
    EndpointTimeout,
    /// The remote endpoint returned an error status.
    EndpointError,
    /// The sub-LLM call budget is depleted.
    BudgetExhausted,
    /// The result is too large to materialize.
    TooLarge,
    /// An internal failure the tool converted to data.
    Internal,
}

impl ToolErrorKind {
    /// Stable string form rendered into the error dict.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::NotFound => "not-found",
            ToolErrorKind::BadInput => "bad-input",
            ToolErrorKind::UnknownHandle => "unknown-handle",
            ToolErrorKind::EndpointUnreachable => "endpoint-unreachable",
            ToolErrorKind::EndpointTimeout => "endpoint-timeout",
            ToolErrorKind::EndpointError => "endpoint-error",
            ToolErrorKind::BudgetExhausted => "budget-exhausted",
            ToolErrorKind::TooLarge => "too-large",
            ToolErrorKind::Internal => "internal",
        }
    }
}

/// A recoverable tool failure.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", kind.as_str())]
pub struct ToolError {
    /// The failure kind.
    pub kind: ToolErrorKind,
    /// Human-readable message.
    pub message: String,
    /// A hint for the model's next attempt.
    pub hint: String,
}

impl ToolError {
    /// Build an error with a hint.
    pub fn new(
        kind: ToolErrorKind,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// A `not-found` error.
    pub fn not_found(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, message, hint)
    }

    /// A `bad-input` error.
    pub fn bad_input(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::BadInput, message, hint)
    }

    /// An `unknown-handle` error.
    pub fn unknown_handle(name: &str) -> Self {
        Self::new(
            ToolErrorKind::UnknownHandle,
            format!("no result handle named `{name}`"),
            "store a result first with sparql_local(..., name=...)",
        )
    }

    /// The error dict the REPL shows the model.
    pub fn to_dict(&self) -> Value {
        json!({
            "error": self.kind.as_str(),
            "message": self.message,
            "hint": self.hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        let e = ToolError::bad_input("no such prefix", "declare it");
        assert_eq!(e.to_string(), "bad-input: no such prefix");
    }

    #[test]
    fn dict_has_all_fields() {
        let e = ToolError::unknown_handle("x");
        let d = e.to_dict();
        assert_eq!(d["error"], "unknown-handle");
        assert!(d["message"].as_str().unwrap().contains("`x`"));
        assert!(!d["hint"].as_str().unwrap().is_empty());
    }
}
