#![deny(missing_docs)]
//! The ReasoningBank — persistent procedural memory for corvid.
//!
//! Surrounds each driver invocation with the memory lifecycle:
//!
//! | Phase | Entry point | What happens |
//! |-------|-------------|--------------|
//! | Retrieve | [`MemoryStore::retrieve`] | top-k lexical match, scope-filtered |
//! | Inject | [`render_memories`] | bounded in-context section |
//! | Judge | [`Judge`] | sub-LLM verdict over the trajectory artifact |
//! | Extract | [`Extractor`] | 0–3 procedural memory drafts |
//! | Store | [`MemoryStore::upsert_item`] + record_* | idempotent, content-addressed |
//!
//! Two backends implement [`MemoryStore`]: [`SqliteBank`] (the reference
//! adapter — SQLite with an FTS5 index and bm25 ranking) and
//! [`MemoryBank`] (in-process, hand-rolled BM25; for tests and
//! store-less runs). Memory items are exclusively owned by the store;
//! retrieval returns copies the application must treat as read-only.

pub mod bank;
pub mod bm25;
pub mod extract;
pub mod inject;
pub mod judge;
pub mod meta_analysis;
pub mod pack;
pub mod sqlite;
pub mod store;

pub use bank::MemoryBank;
pub use extract::Extractor;
pub use inject::{estimate_level, render_memories, rerank_by_level, MEMORY_INJECTION_MAX};
pub use judge::Judge;
pub use meta_analysis::MetaAnalyser;
pub use pack::{export_pack, import_pack, PackMeta};
pub use sqlite::SqliteBank;
pub use store::{ExportFilter, MemoryStore, RunRecord, TrajectoryDigest};
