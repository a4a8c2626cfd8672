//! Per-run note scratchpad.
//!
//! A string-keyed dictionary intended as compaction space outside the
//! main context: the model parks intermediate findings here instead of
//! re-printing them every step.

use crate::args::ToolArgs;
use crate::bound::{bound, PREVIEW_BUDGET};
use crate::error::ToolError;
use crate::registry::ToolDyn;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// The per-run note store.
pub struct NoteStore {
    notes: Mutex<BTreeMap<String, String>>,
}

impl NoteStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            notes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Write (or overwrite) a note.
    pub fn write(&self, key: impl Into<String>, value: impl Into<String>) {
        self.notes
            .lock()
            .expect("note store poisoned")
            .insert(key.into(), value.into());
    }

    /// Read a note.
    pub fn read(&self, key: &str) -> Option<String> {
        self.notes
            .lock()
            .expect("note store poisoned")
            .get(key)
            .cloned()
    }

    /// All note keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.notes
            .lock()
            .expect("note store poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for NoteStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `write_note(key, value)`.
pub struct WriteNoteTool {
    notes: Arc<NoteStore>,
}

impl WriteNoteTool {
    /// Build over the per-run note store.
    pub fn new(notes: Arc<NoteStore>) -> Self {
        Self { notes }
    }
}

impl ToolDyn for WriteNoteTool {
    fn name(&self) -> &str {
        "write_note"
    }
    fn summary(&self) -> &str {
        "Save a note under a key for later steps."
    }
    fn signature(&self) -> &str {
        "write_note(key, value)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let key = args.require_str(0, "key")?.to_string();
            let value = match args.require_value(1, "value")? {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.notes.write(&key, value);
            Ok(json!({"saved": key}))
        })
    }
}

/// `read_note(key)`.
pub struct ReadNoteTool {
    notes: Arc<NoteStore>,
}

impl ReadNoteTool {
    /// Build over the per-run note store.
    pub fn new(notes: Arc<NoteStore>) -> Self {
        Self { notes }
    }
}

impl ToolDyn for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }
    fn summary(&self) -> &str {
        "Read back a previously saved note."
    }
    fn signature(&self) -> &str {
        "read_note(key)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let key = args.require_str(0, "key")?;
            match self.notes.read(key) {
                Some(value) => Ok(json!(bound(&value, PREVIEW_BUDGET * 4))),
                None => Err(ToolError::not_found(
                    format!("no note under `{key}`"),
                    "list_notes() shows saved keys",
                )),
            }
        })
    }
}

/// `list_notes()`.
pub struct ListNotesTool {
    notes: Arc<NoteStore>,
}

impl ListNotesTool {
    /// Build over the per-run note store.
    pub fn new(notes: Arc<NoteStore>) -> Self {
        Self { notes }
    }
}

impl ToolDyn for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }
    fn summary(&self) -> &str {
        "List the keys of all saved notes."
    }
    fn signature(&self) -> &str {
        "list_notes()"
    }
    fn call(
        &self,
        _args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move { Ok(json!(self.notes.keys())) })
    }
}
