//! In-process fallback bank.
//!
//! A `RwLock`-guarded map with hand-rolled BM25 retrieval. Suitable for
//! tests and store-less runs; the durable reference adapter is
//! [`crate::SqliteBank`].

use crate::bm25::Bm25Index;
use crate::store::{ExportFilter, MemoryStore, RunRecord, TrajectoryDigest};
use async_trait::async_trait;
use corvid_core::{
    Judgment, MemoryId, MemoryItem, MemoryUsage, OntologyId, SourceType, StoreError, Trajectory,
    TrajectoryId,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    items: HashMap<MemoryId, MemoryItem>,
    runs: Vec<RunRecord>,
    trajectories: Vec<(Trajectory, String, Option<String>)>,
    judgments: HashMap<TrajectoryId, Judgment>,
    usage: Vec<MemoryUsage>,
}

/// The in-memory ReasoningBank backend.
pub struct MemoryBank {
    inner: RwLock<Inner>,
}

impl MemoryBank {
    /// An empty bank.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryBank {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for MemoryBank {
    async fn upsert_item(&self, item: &MemoryItem) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.items.get_mut(&item.memory_id) {
            Some(existing) => {
                existing.access_count += 1;
                Ok(false)
            }
            None => {
                inner.items.insert(item.memory_id.clone(), item.clone());
                Ok(true)
            }
        }
    }

    async fn get_item(&self, id: &MemoryId) -> Result<Option<MemoryItem>, StoreError> {
        Ok(self.inner.read().await.items.get(id).cloned())
    }

    async fn retrieve(
        &self,
        query: &str,
        ontology: Option<&OntologyId>,
        k: usize,
    ) -> Result<Vec<(MemoryItem, f64)>, StoreError> {
        let mut inner = self.inner.write().await;
        let candidates: Vec<MemoryId> = inner
            .items
            .values()
            .filter(|item| item.scope.admits(ontology))
            .map(|item| item.memory_id.clone())
            .collect();
        let documents: Vec<String> = candidates
            .iter()
            .map(|id| inner.items[id].document())
            .collect();
        let scores = Bm25Index::build(&documents).scores(query);

        let mut scored: Vec<(MemoryId, f64)> = candidates
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score > 0.0)
            .collect();
        // Meta-analysis items win ties.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let meta = |id: &MemoryId| {
                        inner.items[id].source_type == SourceType::MetaAnalysis
                    };
                    meta(&b.0).cmp(&meta(&a.0))
                })
        });
        scored.truncate(k);

        let mut out = Vec::with_capacity(scored.len());
        for (id, score) in scored {
            if let Some(item) = inner.items.get_mut(&id) {
                item.access_count += 1;
                out.push((item.clone(), score));
            }
        }
        Ok(out)
    }

    async fn record_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.inner.write().await.runs.push(run.clone());
        Ok(())
    }

    async fn record_trajectory(
        &self,
        trajectory: &Trajectory,
        artifact: &str,
        log_ref: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.write().await.trajectories.push((
            trajectory.clone(),
            artifact.to_string(),
            log_ref.map(String::from),
        ));
        Ok(())
    }

    async fn record_judgment(
        &self,
        trajectory_id: &TrajectoryId,
        judgment: &Judgment,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .judgments
            .insert(trajectory_id.clone(), judgment.clone());
        Ok(())
    }

    async fn record_usage(&self, usage: &[MemoryUsage]) -> Result<(), StoreError> {
        self.inner.write().await.usage.extend_from_slice(usage);
        Ok(())
    }

    async fn bump_outcome(&self, ids: &[MemoryId], success: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for id in ids {
            if let Some(item) = inner.items.get_mut(id) {
                if success {
                    item.success_count += 1;
                } else {
                    item.failure_count += 1;
                }
            }
        }
        Ok(())
    }

    async fn all_items(&self, filter: &ExportFilter) -> Result<Vec<MemoryItem>, StoreError> {
        let inner = self.inner.read().await;
        let mut items: Vec<MemoryItem> = inner
            .items
            .values()
            .filter(|item| filter.admits(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.memory_id.cmp(&b.memory_id));
        Ok(items)
    }

    async fn item_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.items.len())
    }

    async fn recent_trajectory_digests(
        &self,
        n: usize,
    ) -> Result<Vec<TrajectoryDigest>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .trajectories
            .iter()
            .rev()
            .take(n)
            .map(|(trajectory, artifact, _)| TrajectoryDigest {
                trajectory_id: trajectory.trajectory_id.clone(),
                query: trajectory.query.clone(),
                iteration_count: trajectory.iteration_count(),
                converged: trajectory.converged,
                is_success: inner
                    .judgments
                    .get(&trajectory.trajectory_id)
                    .map(|j| j.is_success),
                artifact: artifact.clone(),
            })
            .collect())
    }
}
