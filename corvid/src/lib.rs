#![deny(missing_docs)]
//! # corvid — umbrella crate
//!
//! Agentic SPARQL query construction over RDF ontologies with
//! procedural memory. Re-exports the component crates and provides the
//! caller-facing [`Runner`], which wraps every driver invocation in the
//! memory lifecycle (retrieve → inject → execute → judge → extract →
//! store).
//!
//! ```no_run
//! use corvid::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let ontology = Ontology::load("prov.ttl")?;
//! let model = SharedChatProvider::new(OpenAiProvider::new("sk-..."));
//! let store: Arc<dyn MemoryStore> = Arc::new(SqliteBank::open("bank.db")?);
//!
//! let runner = Runner::new(ontology, model.clone(), model, RunnerConfig::default())?
//!     .with_store(store)
//!     .with_ontology_id("prov");
//! let outcome = runner.run("What is an Activity?").await?;
//! println!("{}\n{}", outcome.answer, outcome.sparql);
//! # Ok(())
//! # }
//! ```

pub use corvid_core;
pub use corvid_driver;
pub use corvid_graph;
pub use corvid_llm;
pub use corvid_memory;
pub use corvid_provider_openai;
pub use corvid_repl;
pub use corvid_tools;
pub use corvid_verify;

mod config;
mod runner;

pub use config::RunnerConfig;
pub use runner::{RunError, RunOutcome, Runner};

/// Happy-path imports for composing corvid systems.
pub mod prelude {
    pub use crate::{RunError, RunOutcome, Runner, RunnerConfig};
    pub use corvid_core::{
        Confidence, FinishReason, Judgment, MemoryId, MemoryItem, MemoryScope, OntologyId,
        Prediction, RunId, Signature, SourceType, Trajectory,
    };
    pub use corvid_driver::{DriverConfig, RlmDriver};
    pub use corvid_graph::{GraphMeta, MetaConfig, Ontology, SenseCard};
    pub use corvid_llm::{ChatProvider, ProviderError, SharedChatProvider};
    pub use corvid_memory::{
        export_pack, import_pack, ExportFilter, MemoryBank, MemoryStore, SqliteBank,
    };
    pub use corvid_provider_openai::OpenAiProvider;
    pub use corvid_tools::{ToolDyn, ToolError, ToolRegistry};
    pub use corvid_verify::Verifier;
}
