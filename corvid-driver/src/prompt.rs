//! Prompt rendering: static instructions, tool docs, input fields, and
//! the THINK/CODE/OUTPUT history.

use crate::config::DriverConfig;
use corvid_core::{FieldKind, IterationEntry, Signature};
use corvid_tools::ToolRegistry;
use serde_json::Value;
use std::collections::BTreeMap;

/// Render the static system instructions for a signature + tool set.
pub fn render_system(signature: &Signature, tools: &ToolRegistry) -> String {
    let mut out = String::new();
    out.push_str(
        "You work in a persistent REPL over a loaded RDF ontology. Each turn you reply with \
         a short reasoning paragraph followed by EXACTLY ONE fenced code block containing \
         statements to execute. Only the first code block is executed; any others are \
         discarded.\n\n",
    );
    out.push_str(
        "The snippet language: one statement per line; `name = expr` assignments; calls like \
         `tool(arg, key=value)`; strings, numbers, lists `[...]`, dicts `{\"k\": v}`, \
         indexing `x[0]` / `x[\"k\"]`, `+`/`-`; `print(...)` to show values. Bare call \
         statements print their result; assignments are silent. Variables persist across \
         turns. Large SPARQL results are stored under named handles - inspect them with the \
         res_* tools instead of printing everything.\n\n",
    );
    out.push_str("Tools:\n");
    out.push_str(&tools.render_docs());
    out.push_str("\nWhen you can answer, finish with a single call:\n  SUBMIT(");
    let fields: Vec<String> = signature
        .outputs
        .iter()
        .map(|f| format!("{}=...", f.name))
        .collect();
    out.push_str(&fields.join(", "));
    out.push_str(")\nwhere\n");
    for field in &signature.outputs {
        out.push_str(&format!(
            "  {} ({}{}): {}\n",
            field.name,
            match field.kind {
                FieldKind::Text => "text",
                FieldKind::Mapping => "mapping",
            },
            if field.required { "" } else { ", optional" },
            field.description
        ));
    }
    if !signature.instructions.is_empty() {
        out.push('\n');
        out.push_str(&signature.instructions);
        out.push('\n');
    }
    out
}

/// Render the per-step user message: input fields plus history.
pub fn render_user(
    signature: &Signature,
    inputs: &BTreeMap<String, Value>,
    history: &[IterationEntry],
    config: &DriverConfig,
    discarded_note: bool,
) -> String {
    let mut out = String::new();
    for field in &signature.inputs {
        if let Some(value) = inputs.get(&field.name) {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("## {} ({})\n{}\n\n", field.name, field.description, rendered));
        }
    }

    if !history.is_empty() {
        out.push_str("## Previous steps\n");
        let full_from = history.len().saturating_sub(config.history_keep_full);
        for (i, entry) in history.iter().enumerate() {
            if i < full_from {
                out.push_str(&format!(
                    "### Step {} (compressed)\nCODE: {}\nOUTPUT: {}\n",
                    entry.index,
                    clip(&entry.code, config.history_compressed_chars),
                    clip(&entry.output, config.history_compressed_chars),
                ));
            } else {
                out.push_str(&format!("### Step {}\n", entry.index));
                if !entry.reasoning.is_empty() {
                    out.push_str(&format!("THINK: {}\n", entry.reasoning));
                }
                out.push_str(&format!("CODE:\n```\n{}\n```\nOUTPUT:\n{}\n", entry.code, entry.output));
            }
        }
        out.push('\n');
    }

    if discarded_note {
        out.push_str(
            "Note: your last reply contained more than one code block; only the first was \
             executed.\n\n",
        );
    }
    out.push_str("Reply with your reasoning and ONE fenced code block.\n");
    out
}

fn clip(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}
