//! Tool interface and registry.
//!
//! [`ToolDyn`] is object-safe; tools are stored as `Arc<dyn ToolDyn>` in
//! [`ToolRegistry`]. The driver renders each tool's summary and signature
//! verbatim into the model's instructions, so summaries are part of the
//! external interface: the first line must stay within 80 chars.

use crate::args::ToolArgs;
use crate::error::ToolError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Object-safe trait for tool implementations.
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name, as called from the REPL.
    fn name(&self) -> &str;

    /// One-line description (≤80 chars; rendered into instructions).
    fn summary(&self) -> &str;

    /// The rendered call signature, e.g.
    /// `search_entity(term, limit=10)`. Rendered from this record, not
    /// from reflection.
    fn signature(&self) -> &str;

    /// Execute the tool. Failures come back as data, never panics.
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>>;
}

/// Registry of tools available to a run.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolDyn>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolDyn>) {
        debug_assert!(
            tool.summary().lines().next().unwrap_or("").len() <= 80,
            "tool `{}` summary first line exceeds 80 chars",
            tool.name()
        );
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.get(name)
    }

    /// Iterate over all registered tools, in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ToolDyn>> {
        self.tools.values()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Render the tool documentation block for the driver's instructions:
    /// one `signature — summary` line per tool.
    pub fn render_docs(&self) -> String {
        let mut out = String::new();
        for tool in self.iter() {
            out.push_str(&format!("  {} — {}\n", tool.signature(), tool.summary()));
        }
        out
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
