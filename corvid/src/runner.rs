//! The caller-facing runner: one `run()` per user query, wrapped in the
//! memory lifecycle.

use crate::config::RunnerConfig;
use corvid_core::{
    DriverError, FinishReason, Judgment, MemoryId, MemoryItem, MemoryUsage, OntologyId,
    Provenance, RunId, Signature, SourceType, StoreError, Trajectory,
};
use corvid_driver::{DriverConfig, RlmDriver};
use corvid_graph::{GraphError, GraphMeta, Ontology, SenseCard};
use corvid_llm::SharedChatProvider;
use corvid_memory::{
    render_memories, rerank_by_level, Extractor, Judge, MemoryStore, MetaAnalyser, RunRecord,
};
use corvid_repl::Interpreter;
use corvid_tools::{standard_tools, CallBudget, FeedbackInjector, HandleRegistry, NoteStore};
use corvid_verify::Verifier;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Chars of output kept per entry in the judge/extract artifact.
const ARTIFACT_ENTRY_CHARS: usize = 1_000;

/// Errors escaping a run.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Ontology loading or metadata derivation failed.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    /// The driver crashed (persistent model failure, interpreter
    /// lifecycle failure).
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    /// The memory backend failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The result of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The grounded natural-language answer.
    pub answer: String,
    /// The SPARQL query behind the answer (possibly empty).
    pub sparql: String,
    /// Evidence map supporting the answer.
    pub evidence: Value,
    /// The full trajectory.
    pub trajectory: Trajectory,
    /// Iterations used.
    pub iteration_count: u32,
    /// Whether the run converged on a terminal call.
    pub converged: bool,
    /// Why the run stopped (terminal, exhausted, or cancelled).
    pub reason: FinishReason,
    /// Memory items retrieved into the context.
    pub retrieved: Vec<MemoryId>,
    /// Memory items newly stored after the run.
    pub stored: Vec<MemoryId>,
    /// The judge's verdict.
    pub judgment: Option<Judgment>,
}

/// The in-process entry point: owns the loaded ontology and its derived
/// metadata, the model providers, and (optionally) the ReasoningBank.
/// Each `run` builds fresh per-run state (handle registry, note store,
/// interpreter, call budget) — concurrent runs need separate runners
/// only when they must not share the memory backend connection.
pub struct Runner {
    ontology: Arc<Ontology>,
    meta: Arc<GraphMeta>,
    ontology_id: Option<OntologyId>,
    ontology_path: Option<String>,
    sense_card: SenseCard,
    root: SharedChatProvider,
    sub: SharedChatProvider,
    store: Option<Arc<dyn MemoryStore>>,
    config: RunnerConfig,
    runs_completed: AtomicUsize,
}

impl Runner {
    /// Build a runner over a loaded ontology and two providers (root
    /// model and sub-LLM; they may be the same).
    pub fn new(
        ontology: Ontology,
        root: SharedChatProvider,
        sub: SharedChatProvider,
        config: RunnerConfig,
    ) -> Result<Self, RunError> {
        let meta = GraphMeta::derive(&ontology, &config.meta)?;
        Ok(Self {
            ontology: Arc::new(ontology),
            meta: Arc::new(meta),
            ontology_id: None,
            ontology_path: None,
            sense_card: SenseCard::default(),
            root,
            sub,
            store: None,
            config,
            runs_completed: AtomicUsize::new(0),
        })
    }

    /// Attach a memory backend.
    pub fn with_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the ontology id used for memory scoping.
    pub fn with_ontology_id(mut self, id: impl Into<OntologyId>) -> Self {
        self.ontology_id = Some(id.into());
        self
    }

    /// Record where the ontology was loaded from (for the run row).
    pub fn with_ontology_path(mut self, path: impl Into<String>) -> Self {
        self.ontology_path = Some(path.into());
        self
    }

    /// Attach a sense card, injected once per run.
    pub fn with_sense_card(mut self, card: SenseCard) -> Self {
        self.sense_card = card;
        self
    }

    /// The derived graph metadata (read-only).
    pub fn meta(&self) -> &GraphMeta {
        &self.meta
    }

    /// Load human-curated seed memories (stored as `human-seed`).
    pub async fn seed_memories(
        &self,
        seeds: Vec<MemoryItem>,
    ) -> Result<Vec<MemoryId>, RunError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::with_capacity(seeds.len());
        for mut seed in seeds {
            seed.source_type = SourceType::HumanSeed;
            if seed.provenance.source.is_empty() {
                seed.provenance.source = "seed".into();
            }
            store.upsert_item(&seed).await?;
            ids.push(seed.memory_id);
        }
        Ok(ids)
    }

    /// Answer one query.
    pub async fn run(&self, query: &str) -> Result<RunOutcome, RunError> {
        self.run_with_cancel(query, None).await
    }

    /// Answer one query, stopping between steps once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        query: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<RunOutcome, RunError> {
        let run_id = RunId::mint();
        tracing::info!(run = %run_id, query, "run starting");

        // Retrieve.
        let mut retrieved_items = match &self.store {
            Some(store) => {
                store
                    .retrieve(query, self.ontology_id.as_ref(), self.config.retrieve_k)
                    .await?
            }
            None => Vec::new(),
        };
        rerank_by_level(query, &mut retrieved_items);
        let retrieved_ids: Vec<MemoryId> = retrieved_items
            .iter()
            .map(|(item, _)| item.memory_id.clone())
            .collect();

        // Inject.
        let mut context = String::new();
        if !self.sense_card.is_empty() {
            context.push_str(self.sense_card.as_str());
            context.push_str("\n\n");
        }
        context.push_str(&render_memories(&retrieved_items));

        // Per-run state.
        let handles = Arc::new(HandleRegistry::new());
        let notes = Arc::new(NoteStore::new());
        let budget = Arc::new(CallBudget::new(self.config.max_llm_calls));
        let injector: Option<Arc<dyn FeedbackInjector>> = if self.config.enable_verification {
            Some(Arc::new(Verifier::new(self.meta.clone())))
        } else {
            None
        };
        let tools = Arc::new(standard_tools(
            self.ontology.clone(),
            self.meta.clone(),
            handles,
            notes,
            self.sub.clone(),
            budget,
            injector,
            self.config.allow_remote_endpoints,
        ));
        let interpreter =
            Interpreter::with_output_limit(tools.clone(), self.config.output_truncation_limit);
        let driver_config = DriverConfig {
            model: self.config.model.clone(),
            max_iterations: self.config.max_iterations,
            ..DriverConfig::default()
        };
        let mut driver = RlmDriver::new(
            self.root.clone(),
            tools,
            interpreter,
            Signature::graph_qa(),
            driver_config,
        );

        let inputs: BTreeMap<String, Value> = [
            ("query".to_string(), json!(query)),
            ("context".to_string(), json!(context)),
        ]
        .into();

        // Execute. A fatal driver error still persists the partial
        // trajectory before propagating.
        let mut prediction = match driver.run(run_id.clone(), inputs, cancel).await {
            Ok(prediction) => prediction,
            Err(e) => {
                if let (Some(store), Some(partial)) = (&self.store, driver.take_partial()) {
                    let artifact = partial.artifact(ARTIFACT_ENTRY_CHARS);
                    let _ = store.record_run(&self.run_record(&run_id)).await;
                    let _ = store.record_trajectory(&partial, &artifact, None).await;
                }
                return Err(e.into());
            }
        };
        prediction.retrieved = retrieved_ids.clone();

        // Judge.
        let artifact = prediction.trajectory.artifact(ARTIFACT_ENTRY_CHARS);
        let final_output = prediction
            .trajectory
            .final_output
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let judgment = Judge::new(self.sub.clone())
            .judge(query, &final_output, &artifact)
            .await;
        tracing::info!(
            run = %run_id,
            success = judgment.is_success,
            reason = %judgment.reason,
            "run judged"
        );

        // Extract + store.
        let mut stored_ids = Vec::new();
        if let Some(store) = &self.store {
            if self.config.extract_memories {
                let provenance = Provenance {
                    source: "extraction".into(),
                    trajectory_id: Some(prediction.trajectory.trajectory_id.clone()),
                    run_id: Some(run_id.clone()),
                    pack_id: None,
                    supersedes: Vec::new(),
                };
                let drafts = Extractor::new(self.sub.clone())
                    .extract(
                        query,
                        &artifact,
                        &judgment,
                        self.ontology_id.as_ref(),
                        provenance,
                    )
                    .await;
                for item in &drafts {
                    store.upsert_item(item).await?;
                    stored_ids.push(item.memory_id.clone());
                }
            }

            store.record_run(&self.run_record(&run_id)).await?;
            store
                .record_trajectory(&prediction.trajectory, &artifact, None)
                .await?;
            store
                .record_judgment(&prediction.trajectory.trajectory_id, &judgment)
                .await?;
            let usage: Vec<MemoryUsage> = retrieved_items
                .iter()
                .enumerate()
                .map(|(i, (item, score))| MemoryUsage {
                    trajectory_id: prediction.trajectory.trajectory_id.clone(),
                    memory_id: item.memory_id.clone(),
                    rank: (i + 1) as u32,
                    score: *score,
                })
                .collect();
            store.record_usage(&usage).await?;
            store
                .bump_outcome(&retrieved_ids, judgment.is_success)
                .await?;

            let completed = self.runs_completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(every) = self.config.meta_analysis_every {
                let analyser = MetaAnalyser::new(self.sub.clone(), every);
                if analyser.due(completed) {
                    let digests = store.recent_trajectory_digests(every).await?;
                    for item in analyser.analyse(&digests).await {
                        store.upsert_item(&item).await?;
                        stored_ids.push(item.memory_id.clone());
                    }
                }
            }
        }
        prediction.stored = stored_ids.clone();

        Ok(RunOutcome {
            answer: prediction.text("answer").to_string(),
            sparql: prediction.text("sparql").to_string(),
            evidence: prediction
                .fields
                .get("evidence")
                .cloned()
                .unwrap_or_else(|| json!({})),
            iteration_count: prediction.iteration_count,
            converged: prediction.converged,
            reason: prediction.reason,
            trajectory: prediction.trajectory,
            retrieved: retrieved_ids,
            stored: stored_ids,
            judgment: Some(judgment),
        })
    }

    fn run_record(&self, run_id: &RunId) -> RunRecord {
        RunRecord {
            run_id: run_id.clone(),
            created_at: chrono::Utc::now(),
            model_id: self
                .config
                .model
                .clone()
                .unwrap_or_else(|| "provider-default".into()),
            ontology_id: self.ontology_id.clone(),
            ontology_path: self.ontology_path.clone(),
            notes: String::new(),
        }
    }
}
