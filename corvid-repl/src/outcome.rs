//! Execution outcomes.

use serde_json::Value;
use std::collections::BTreeMap;

/// How one `execute` call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The snippet called the termination callable; the keyword payload
    /// is the run's structured result (validated by the driver).
    Terminal(BTreeMap<String, Value>),
    /// Normal completion: the captured, size-bounded output.
    Text(String),
    /// User code failed; the loop continues. `output` holds whatever was
    /// printed before the failure.
    RecoverableError {
        /// The error class (`SyntaxError`, `NameError`, `TypeError`,
        /// `KeyError`, `IndexError`, `ValueError`).
        class: String,
        /// The error message, with position where available.
        message: String,
        /// Partial output captured before the failure.
        output: String,
    },
}

impl ExecutionOutcome {
    /// Render the outcome as the step output the model sees.
    pub fn as_step_output(&self) -> String {
        match self {
            ExecutionOutcome::Terminal(_) => String::new(),
            ExecutionOutcome::Text(text) => text.clone(),
            ExecutionOutcome::RecoverableError {
                class,
                message,
                output,
            } => {
                if output.is_empty() {
                    format!("[{class}] {message}")
                } else {
                    format!("{output}\n[{class}] {message}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_output_includes_partial_prints() {
        let outcome = ExecutionOutcome::RecoverableError {
            class: "NameError".into(),
            message: "unknown variable `x`".into(),
            output: "first line".into(),
        };
        let rendered = outcome.as_step_output();
        assert!(rendered.starts_with("first line"));
        assert!(rendered.contains("[NameError]"));
    }
}
