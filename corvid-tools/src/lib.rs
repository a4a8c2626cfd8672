#![deny(missing_docs)]
//! Bounded tool surface and result-handle registry for the corvid REPL.
//!
//! Defines the [`ToolDyn`] trait for object-safe tool abstraction and
//! [`ToolRegistry`] for managing collections of tools, plus the built-in
//! tool set the runtime exposes into the REPL:
//!
//! - ontology exploration over [`corvid_graph::GraphMeta`]
//!   (`search_entity`, `describe_entity`, `probe_relationships`,
//!   `class_hierarchy`, `predicate_frequency`);
//! - SPARQL execution with handle-returning semantics (`sparql_local`,
//!   `sparql_remote`) and bounded handle inspectors (`res_head`,
//!   `res_sample`, `res_where`, `res_group`, `res_distinct`);
//! - sub-LLM delegation under a per-run call budget (`llm_query`,
//!   `llm_query_batched`);
//! - a per-run note scratchpad (`write_note`, `read_note`, `list_notes`).
//!
//! Every tool is *bounded*: output is capped with an explicit truncation
//! marker, and failures are returned as data (a [`ToolError`] the REPL
//! renders as an error dict) — a tool never tears down the loop.

pub mod args;
pub mod bound;
pub mod delegate;
pub mod error;
pub mod explore;
pub mod handles;
pub mod inspect;
pub mod notes;
pub mod registry;
pub mod sparql;

pub use args::ToolArgs;
pub use bound::{bound, PREVIEW_BUDGET};
pub use delegate::CallBudget;
pub use error::{ToolError, ToolErrorKind};
pub use handles::{HandleProvenance, HandleRegistry, ResultHandle, ResultSet};
pub use notes::NoteStore;
pub use registry::{ToolDyn, ToolRegistry};
pub use sparql::FeedbackInjector;

use corvid_graph::{GraphMeta, Ontology};
use corvid_llm::SharedChatProvider;
use std::sync::Arc;

/// Assemble the standard tool set over the given per-run state.
///
/// `injector` is the verification seam: when present, every SPARQL
/// execution is reviewed and the feedback block is appended to the tool
/// output. `endpoint_allowed` gates `sparql_remote`.
#[allow(clippy::too_many_arguments)]
pub fn standard_tools(
    ontology: Arc<Ontology>,
    meta: Arc<GraphMeta>,
    handles: Arc<HandleRegistry>,
    notes: Arc<NoteStore>,
    sub_llm: SharedChatProvider,
    budget: Arc<CallBudget>,
    injector: Option<Arc<dyn FeedbackInjector>>,
    endpoint_allowed: bool,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(explore::SearchEntityTool::new(meta.clone())));
    registry.register(Arc::new(explore::DescribeEntityTool::new(
        ontology.clone(),
        meta.clone(),
    )));
    registry.register(Arc::new(explore::ProbeRelationshipsTool::new(
        ontology.clone(),
        meta.clone(),
    )));
    registry.register(Arc::new(explore::ClassHierarchyTool::new(meta.clone())));
    registry.register(Arc::new(explore::PredicateFrequencyTool::new(meta)));
    registry.register(Arc::new(sparql::SparqlLocalTool::new(
        ontology,
        handles.clone(),
        injector.clone(),
    )));
    if endpoint_allowed {
        registry.register(Arc::new(sparql::SparqlRemoteTool::new(
            handles.clone(),
            injector,
        )));
    }
    registry.register(Arc::new(inspect::ResHeadTool::new(handles.clone())));
    registry.register(Arc::new(inspect::ResSampleTool::new(handles.clone())));
    registry.register(Arc::new(inspect::ResWhereTool::new(handles.clone())));
    registry.register(Arc::new(inspect::ResGroupTool::new(handles.clone())));
    registry.register(Arc::new(inspect::ResDistinctTool::new(handles)));
    registry.register(Arc::new(delegate::LlmQueryTool::new(
        sub_llm.clone(),
        budget.clone(),
    )));
    registry.register(Arc::new(delegate::LlmQueryBatchedTool::new(sub_llm, budget)));
    registry.register(Arc::new(notes::WriteNoteTool::new(notes.clone())));
    registry.register(Arc::new(notes::ReadNoteTool::new(notes.clone())));
    registry.register(Arc::new(notes::ListNotesTool::new(notes)));
    registry
}
