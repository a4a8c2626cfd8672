//! The store seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corvid_core::{
    Judgment, MemoryId, MemoryItem, MemoryUsage, OntologyId, RunId, SourceType, StoreError,
    Trajectory, TrajectoryId,
};
use serde::{Deserialize, Serialize};

/// One caller-facing run, as persisted in `runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// The run id.
    pub run_id: RunId,
    /// When the run started.
    pub created_at: DateTime<Utc>,
    /// Root model identifier.
    pub model_id: String,
    /// The ontology the run targeted.
    pub ontology_id: Option<OntologyId>,
    /// Path the ontology was loaded from.
    pub ontology_path: Option<String>,
    /// Free-form notes.
    pub notes: String,
}

/// Filter for [`MemoryStore::all_items`] and pack export.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    /// Keep only this source type.
    pub source_type: Option<SourceType>,
    /// Keep only items whose scope admits this ontology.
    pub ontology: Option<OntologyId>,
    /// Keep only items retrieved at least this often.
    pub min_access: u64,
}

impl ExportFilter {
    /// Whether an item passes the filter.
    pub fn admits(&self, item: &MemoryItem) -> bool {
        if let Some(source_type) = self.source_type {
            if item.source_type != source_type {
                return false;
            }
        }
        if !item.scope.admits(self.ontology.as_ref()) && self.ontology.is_some() {
            return false;
        }
        item.access_count >= self.min_access
    }
}

/// A compact per-trajectory digest for the meta-analyser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryDigest {
    /// The trajectory id.
    pub trajectory_id: TrajectoryId,
    /// The task query.
    pub query: String,
    /// Iterations used.
    pub iteration_count: u32,
    /// Whether the run converged.
    pub converged: bool,
    /// The judge's verdict, when one was recorded.
    pub is_success: Option<bool>,
    /// The stored artifact (bounded trajectory text).
    pub artifact: String,
}

/// The ReasoningBank's storage seam.
///
/// Object-safe so runners can hold `Arc<dyn MemoryStore>`. All writes
/// are idempotent at the item level: upserting an existing id bumps its
/// counters and changes nothing else.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert a memory item, or bump counters when the id exists.
    /// Returns `true` when a new row was inserted.
    async fn upsert_item(&self, item: &MemoryItem) -> Result<bool, StoreError>;

    /// Fetch one item.
    async fn get_item(&self, id: &MemoryId) -> Result<Option<MemoryItem>, StoreError>;

    /// Top-k lexical retrieval over `title ‖ description ‖ tags`,
    /// scope-filtered (universal items or a matching ontology), ordered
    /// by descending score. Increments each returned item's access
    /// counter.
    async fn retrieve(
        &self,
        query: &str,
        ontology: Option<&OntologyId>,
        k: usize,
    ) -> Result<Vec<(MemoryItem, f64)>, StoreError>;

    /// Persist a run row.
    async fn record_run(&self, run: &RunRecord) -> Result<(), StoreError>;

    /// Persist a trajectory with its bounded artifact and optional log
    /// file pointer.
    async fn record_trajectory(
        &self,
        trajectory: &Trajectory,
        artifact: &str,
        log_ref: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Persist a judgment for a trajectory.
    async fn record_judgment(
        &self,
        trajectory_id: &TrajectoryId,
        judgment: &Judgment,
    ) -> Result<(), StoreError>;

    /// Persist the retrieval records of one run.
    async fn record_usage(&self, usage: &[MemoryUsage]) -> Result<(), StoreError>;

    /// After judgment: bump success/failure counters on the items that
    /// were in context.
    async fn bump_outcome(&self, ids: &[MemoryId], success: bool) -> Result<(), StoreError>;

    /// All items passing the filter, ordered by id (deterministic for
    /// export).
    async fn all_items(&self, filter: &ExportFilter) -> Result<Vec<MemoryItem>, StoreError>;

    /// Number of stored items.
    async fn item_count(&self) -> Result<usize, StoreError>;

    /// Digests of the most recent trajectories, newest first.
    async fn recent_trajectory_digests(
        &self,
        n: usize,
    ) -> Result<Vec<TrajectoryDigest>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_core::MemoryScope;

    #[test]
    fn export_filter_admits() {
        let item = MemoryItem::new(
            "t",
            "d",
            "c",
            SourceType::Success,
            MemoryScope::universal(),
        );
        let all = ExportFilter::default();
        assert!(all.admits(&item));

        let wrong_type = ExportFilter {
            source_type: Some(SourceType::HumanSeed),
            ..ExportFilter::default()
        };
        assert!(!wrong_type.admits(&item));

        let needs_access = ExportFilter {
            min_access: 1,
            ..ExportFilter::default()
        };
        assert!(!needs_access.admits(&item));
    }

    #[test]
    fn ontology_filter_uses_scope_admission() {
        let mut scope = MemoryScope::universal();
        scope.ontology = Some(OntologyId::new("prov"));
        let pinned = MemoryItem::new("t", "d", "c", SourceType::Success, scope);
        let other = ExportFilter {
            ontology: Some(OntologyId::new("go")),
            ..ExportFilter::default()
        };
        assert!(!other.admits(&pinned));
        let same = ExportFilter {
            ontology: Some(OntologyId::new("prov")),
            ..ExportFilter::default()
        };
        assert!(same.admits(&pinned));
    }
}
