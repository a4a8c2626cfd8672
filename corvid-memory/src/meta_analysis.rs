//! Cross-trajectory meta-analysis.
//!
//! Every N runs, a compact digest of the recent trajectories (iteration
//! counts, tool-usage histograms, failure modes) goes to the sub-LLM,
//! which may produce cross-trajectory memory items tagged
//! `meta-analysis`. Those rank above single-trajectory items during
//! retrieval ties.

use crate::judge::json_in_text;
use crate::store::TrajectoryDigest;
use corvid_core::{MemoryItem, MemoryScope, Provenance, SourceType};
use corvid_llm::{ChatMessage, ChatProvider, ChatRequest, SharedChatProvider};
use serde_json::Value;
use std::collections::BTreeMap;

/// Tool names counted in digests.
const KNOWN_TOOLS: &[&str] = &[
    "search_entity",
    "describe_entity",
    "probe_relationships",
    "class_hierarchy",
    "predicate_frequency",
    "sparql_local",
    "sparql_remote",
    "res_head",
    "res_sample",
    "res_where",
    "res_group",
    "res_distinct",
    "llm_query",
    "llm_query_batched",
    "write_note",
    "read_note",
    "list_notes",
];

/// Count tool mentions in a trajectory artifact.
pub fn tool_histogram(artifact: &str) -> BTreeMap<String, usize> {
    let mut histogram = BTreeMap::new();
    for tool in KNOWN_TOOLS {
        let count = artifact.matches(&format!("{tool}(")).count();
        if count > 0 {
            histogram.insert(tool.to_string(), count);
        }
    }
    histogram
}

/// The batch analyser.
pub struct MetaAnalyser {
    provider: SharedChatProvider,
    model: Option<String>,
    /// Runs between analyses.
    pub every: usize,
}

impl MetaAnalyser {
    /// Build over a sub-LLM provider, analysing every `every` runs.
    pub fn new(provider: SharedChatProvider, every: usize) -> Self {
        Self {
            provider,
            model: None,
            every: every.max(1),
        }
    }

    /// Override the analyser model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Whether a run count lands on an analysis boundary.
    pub fn due(&self, run_count: usize) -> bool {
        run_count > 0 && run_count % self.every == 0
    }

    /// Produce cross-trajectory items from the recent digests. Parse
    /// failures yield zero items.
    pub async fn analyse(&self, digests: &[TrajectoryDigest]) -> Vec<MemoryItem> {
        if digests.is_empty() {
            return Vec::new();
        }
        let mut summary = String::new();
        for digest in digests {
            let histogram = tool_histogram(&digest.artifact);
            summary.push_str(&format!(
                "- \"{}\": {} iterations, converged={}, success={:?}, tools={:?}\n",
                digest.query, digest.iteration_count, digest.converged, digest.is_success,
                histogram
            ));
        }
        let prompt = format!(
            "Across the recent agent runs below, identify recurring strategies or failure \
             modes worth remembering. Respond with ONLY a JSON array (possibly empty) of \
             objects: [{{\"title\": str, \"description\": str, \"content\": str, \
             \"tags\": [str]}}]\n\nRUNS:\n{summary}"
        );
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(1_200),
            temperature: Some(0.3),
            stop: Vec::new(),
        };
        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "meta-analysis call failed");
                return Vec::new();
            }
        };
        let Some(Value::Array(items)) = json_in_text(&response.content) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let title = item.get("title")?.as_str()?.to_string();
                let description = item.get("description").and_then(Value::as_str).unwrap_or("");
                let content = item.get("content").and_then(Value::as_str).unwrap_or("");
                let tags: Vec<String> = item
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|t| t.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                Some(
                    MemoryItem::new(
                        title,
                        description,
                        content,
                        SourceType::MetaAnalysis,
                        MemoryScope::universal(),
                    )
                    .with_tags(tags)
                    .with_provenance(Provenance {
                        source: "meta-analysis".into(),
                        ..Provenance::default()
                    }),
                )
            })
            .collect()
    }
}
