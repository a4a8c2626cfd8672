//! The driver's typed input/output contract.
//!
//! A [`Signature`] declares what the driver feeds the model (input fields)
//! and what the terminal call must produce (output fields). Validation is
//! exhaustive: a bad payload reports every violation at once so the model
//! can fix them in one retry.

use crate::id::MemoryId;
use crate::trajectory::{FinishReason, Trajectory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The kind of a terminal output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A string value.
    Text,
    /// A JSON object value.
    Mapping,
}

impl FieldKind {
    /// Whether a JSON value matches this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Mapping => value.is_object(),
        }
    }
}

/// One input field handed to the model each step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    /// Field name as rendered in the prompt.
    pub name: String,
    /// Short description rendered next to the name.
    pub description: String,
}

/// One field the terminal call must (or may) carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputField {
    /// Field name as passed to `SUBMIT`.
    pub name: String,
    /// Expected kind.
    pub kind: FieldKind,
    /// Whether the field must be present.
    pub required: bool,
    /// Short description rendered into the instructions.
    pub description: String,
}

impl OutputField {
    /// A required text field.
    pub fn text(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            required: true,
            description: description.into(),
        }
    }

    /// A required mapping field.
    pub fn mapping(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Mapping,
            required: true,
            description: description.into(),
        }
    }

    /// Mark the field optional (builder style).
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// The typed contract for one driver invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    /// Input fields, rendered in order.
    pub inputs: Vec<InputField>,
    /// Output fields the terminal call must satisfy.
    pub outputs: Vec<OutputField>,
    /// Task-level instructions prepended to the static REPL instructions.
    pub instructions: String,
}

impl Signature {
    /// The default graph-question-answering contract:
    /// `(query, context) → (answer, sparql, evidence)`.
    pub fn graph_qa() -> Self {
        Self {
            inputs: vec![
                InputField {
                    name: "query".into(),
                    description: "The user's natural-language question".into(),
                },
                InputField {
                    name: "context".into(),
                    description: "Ontology sense card and retrieved procedural memories".into(),
                },
            ],
            outputs: vec![
                OutputField::text("answer", "The grounded natural-language answer"),
                OutputField::text("sparql", "The SPARQL query that produced the evidence"),
                OutputField::mapping("evidence", "Identifiers and samples supporting the answer"),
            ],
            instructions: "Answer the question about the loaded ontology. Ground every claim \
                           in graph evidence obtained through the tools."
                .into(),
        }
    }

    /// Validate a terminal payload. Returns the list of violations;
    /// empty means valid.
    pub fn validate(&self, payload: &BTreeMap<String, Value>) -> Vec<String> {
        let mut violations = Vec::new();
        for field in &self.outputs {
            match payload.get(&field.name) {
                None if field.required => {
                    violations.push(format!("missing required field `{}`", field.name));
                }
                None => {}
                Some(value) => {
                    if !field.kind.matches(value) {
                        violations.push(format!(
                            "field `{}` must be {}",
                            field.name,
                            match field.kind {
                                FieldKind::Text => "a string",
                                FieldKind::Mapping => "an object",
                            }
                        ));
                    }
                }
            }
        }
        violations
    }
}

/// The driver's result: validated terminal fields plus the run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// The validated terminal fields.
    pub fields: BTreeMap<String, Value>,
    /// The full trajectory.
    pub trajectory: Trajectory,
    /// Number of iterations used.
    pub iteration_count: u32,
    /// Whether the run converged (terminal call within budget).
    pub converged: bool,
    /// Why the run stopped; `converged` is shorthand for
    /// `reason == Terminal`.
    pub reason: FinishReason,
    /// Memory items retrieved into the context (filled by the runner).
    #[serde(default)]
    pub retrieved: Vec<MemoryId>,
    /// Memory items newly stored after the run (filled by the runner).
    #[serde(default)]
    pub stored: Vec<MemoryId>,
}

impl Prediction {
    /// Fetch a text field, empty string if absent or non-text.
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).and_then(Value::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn graph_qa_valid_payload() {
        let sig = Signature::graph_qa();
        let p = payload(&[
            ("answer", json!("An Activity is something that occurs.")),
            ("sparql", json!("SELECT ?c WHERE { ?c a owl:Class } LIMIT 10")),
            ("evidence", json!({"class": "prov:Activity"})),
        ]);
        assert!(sig.validate(&p).is_empty());
    }

    #[test]
    fn missing_field_reported() {
        let sig = Signature::graph_qa();
        let p = payload(&[("answer", json!("x"))]);
        let violations = sig.validate(&p);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.contains("`sparql`")));
        assert!(violations.iter().any(|v| v.contains("`evidence`")));
    }

    #[test]
    fn wrong_kind_reported() {
        let sig = Signature::graph_qa();
        let p = payload(&[
            ("answer", json!(42)),
            ("sparql", json!("S")),
            ("evidence", json!("not a map")),
        ]);
        let violations = sig.validate(&p);
        assert!(violations.iter().any(|v| v.contains("`answer`")));
        assert!(violations.iter().any(|v| v.contains("`evidence`")));
    }

    #[test]
    fn optional_field_may_be_absent() {
        let mut sig = Signature::graph_qa();
        sig.outputs.push(OutputField::text("note", "extra").optional());
        let p = payload(&[
            ("answer", json!("a")),
            ("sparql", json!("s")),
            ("evidence", json!({})),
        ]);
        assert!(sig.validate(&p).is_empty());
    }

    #[test]
    fn prediction_text_accessor() {
        let sig = Signature::graph_qa();
        let p = Prediction {
            fields: payload(&[("answer", json!("hello"))]),
            trajectory: Trajectory::new(crate::RunId::new("r"), "q", ""),
            iteration_count: 1,
            converged: true,
            reason: FinishReason::Terminal,
            retrieved: vec![],
            stored: vec![],
        };
        let _ = sig;
        assert_eq!(p.text("answer"), "hello");
        assert_eq!(p.text("absent"), "");
    }
}
