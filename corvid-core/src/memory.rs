//! The ReasoningBank's unit of procedural knowledge.
//!
//! A [`MemoryItem`]'s identifier is the first 16 hex chars of the SHA-256
//! of `title ‖ content ‖ normalized-scope`. Identity is a pure function of
//! the immutable content fields; the three running counters are mutable
//! state owned by the store and excluded from hashing.

use crate::id::{MemoryId, OntologyId, RunId, TrajectoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Cap for [`MemoryItem::title`]; [`MemoryItem::new`] clips to these.
pub const TITLE_MAX: usize = 120;
/// Cap for [`MemoryItem::description`].
pub const DESCRIPTION_MAX: usize = 400;
/// Cap for [`MemoryItem::content`].
pub const CONTENT_MAX: usize = 4_000;

/// Where a memory item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// Extracted from a successful trajectory.
    Success,
    /// Extracted from a failed trajectory (what to avoid).
    Failure,
    /// Seeded by a human curator.
    HumanSeed,
    /// Imported from a memory pack.
    PackImported,
    /// Produced by the cross-trajectory meta-analyser.
    MetaAnalysis,
    /// A structured reasoning-chain exemplar.
    Exemplar,
}

impl SourceType {
    /// Stable string form used in storage and packs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Success => "success",
            SourceType::Failure => "failure",
            SourceType::HumanSeed => "human-seed",
            SourceType::PackImported => "pack-imported",
            SourceType::MetaAnalysis => "meta-analysis",
            SourceType::Exemplar => "exemplar",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(SourceType::Success),
            "failure" => Some(SourceType::Failure),
            "human-seed" => Some(SourceType::HumanSeed),
            "pack-imported" => Some(SourceType::PackImported),
            "meta-analysis" => Some(SourceType::MetaAnalysis),
            "exemplar" => Some(SourceType::Exemplar),
            _ => None,
        }
    }
}

/// Complexity level tag for reasoning-chain exemplars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComplexityLevel {
    /// Single-entity lookup.
    L1,
    /// Single-hop relations.
    L2,
    /// Multi-hop traversal.
    L3,
    /// Aggregation or filtering over traversals.
    L4,
    /// Cross-graph or federated reasoning.
    L5,
}

impl ComplexityLevel {
    /// Distance between two levels, for adjacent-level retrieval bias.
    pub fn distance(&self, other: &Self) -> u8 {
        (*self as i8 - *other as i8).unsigned_abs()
    }
}

/// What a memory item applies to. The scope admits a run either
/// universally (`ontology: None`) or when the ontology ids match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryScope {
    /// Pinned ontology, or None for universal items.
    pub ontology: Option<OntologyId>,
    /// Task types this item helps with (e.g. `hierarchy`, `lookup`).
    #[serde(default)]
    pub task_types: Vec<String>,
    /// Tools the item's procedure involves.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Whether the item is expected to transfer across ontologies.
    #[serde(default)]
    pub transferable: bool,
}

impl MemoryScope {
    /// A universal scope (admits every ontology).
    pub fn universal() -> Self {
        Self {
            ontology: None,
            task_types: Vec::new(),
            tools: Vec::new(),
            transferable: true,
        }
    }

    /// Whether this scope admits a run against the given ontology.
    pub fn admits(&self, ontology: Option<&OntologyId>) -> bool {
        match (&self.ontology, ontology) {
            (None, _) => true,
            (Some(mine), Some(theirs)) => mine == theirs,
            (Some(_), None) => false,
        }
    }

    /// The canonical string used for content addressing. Task types and
    /// tools are sorted so field order never changes identity.
    pub fn normalized(&self) -> String {
        let mut task_types = self.task_types.clone();
        task_types.sort();
        let mut tools = self.tools.clone();
        tools.sort();
        format!(
            "ontology={};task_types={};tools={};transferable={}",
            self.ontology.as_ref().map_or("", |o| o.as_str()),
            task_types.join(","),
            tools.join(","),
            self.transferable
        )
    }
}

/// Provenance of a memory item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Free-form source note (`extraction`, `seed`, a pack name, ...).
    pub source: String,
    /// Originating trajectory, when extracted.
    pub trajectory_id: Option<TrajectoryId>,
    /// Originating run, when extracted.
    pub run_id: Option<RunId>,
    /// Pack id, when imported.
    pub pack_id: Option<String>,
    /// Items this one supersedes (consolidation is insert-with-references,
    /// never delete).
    #[serde(default)]
    pub supersedes: Vec<MemoryId>,
}

/// One step of a reasoning-chain exemplar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// The situation before acting.
    pub state: String,
    /// The action taken (usually a tool call).
    pub action: String,
    /// What the action returned.
    pub result: String,
    /// How the result was checked.
    pub verification: String,
}

/// A reusable procedural hint extracted from a past trajectory and
/// retrieved into future contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Content-addressed identifier.
    pub memory_id: MemoryId,
    /// Short title, ≤ [`TITLE_MAX`] chars.
    pub title: String,
    /// One-paragraph description, ≤ [`DESCRIPTION_MAX`] chars.
    pub description: String,
    /// The procedural body, ≤ [`CONTENT_MAX`] chars.
    pub content: String,
    /// Where the item came from.
    pub source_type: SourceType,
    /// The task text that produced the item, if any.
    pub task_query: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Retrieval tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// What the item applies to.
    #[serde(default)]
    pub scope: MemoryScope,
    /// Where it came from, precisely.
    #[serde(default)]
    pub provenance: Provenance,
    /// Times the item was retrieved.
    #[serde(default)]
    pub access_count: u64,
    /// Times a run that retrieved it was judged a success.
    #[serde(default)]
    pub success_count: u64,
    /// Times a run that retrieved it was judged a failure.
    #[serde(default)]
    pub failure_count: u64,
}

impl MemoryItem {
    /// Compute the stable identifier for the given content fields:
    /// the leading hex of `sha256(title ‖ "\n" ‖ content ‖ "\n" ‖
    /// scope.normalized())` (see [`MemoryId::from_digest`]).
    pub fn identity(title: &str, content: &str, scope: &MemoryScope) -> MemoryId {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"\n");
        hasher.update(content.as_bytes());
        hasher.update(b"\n");
        hasher.update(scope.normalized().as_bytes());
        MemoryId::from_digest(&hasher.finalize())
    }

    /// Build an item, clipping over-long fields to their caps and
    /// deriving the identifier from the (clipped) content fields.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
        source_type: SourceType,
        scope: MemoryScope,
    ) -> Self {
        let title = clip_chars(title.into(), TITLE_MAX);
        let description = clip_chars(description.into(), DESCRIPTION_MAX);
        let content = clip_chars(content.into(), CONTENT_MAX);
        let memory_id = Self::identity(&title, &content, &scope);
        Self {
            memory_id,
            title,
            description,
            content,
            source_type,
            task_query: None,
            created_at: Utc::now(),
            tags: Vec::new(),
            scope,
            provenance: Provenance::default(),
            access_count: 0,
            success_count: 0,
            failure_count: 0,
        }
    }

    /// Set tags (builder style).
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set provenance (builder style).
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Set the originating task text (builder style).
    pub fn with_task_query(mut self, query: impl Into<String>) -> Self {
        self.task_query = Some(query.into());
        self
    }

    /// The document view indexed for retrieval: `title ‖ description ‖ tags`.
    pub fn document(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.tags.join(" "))
    }
}

fn clip_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].to_string(),
        None => s,
    }
}

/// One retrieval event: which item was surfaced for which trajectory,
/// at what rank and score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// The trajectory that retrieved the item.
    pub trajectory_id: TrajectoryId,
    /// The retrieved item.
    pub memory_id: MemoryId,
    /// 1-based rank in the top-k list.
    pub rank: u32,
    /// Retrieval score (backend-specific scale, monotone within a list).
    pub score: f64,
}
