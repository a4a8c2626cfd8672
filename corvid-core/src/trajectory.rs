//! The append-only record of one driver run.

use crate::id::{RunId, TrajectoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a run stopped. Persisted with the trajectory so a
/// `converged = false` run is distinguishable after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// A validated terminal call ended the loop.
    Terminal,
    /// The iteration budget ran out; the payload came from the
    /// extract fallback.
    Exhausted,
    /// The caller cancelled between steps.
    Cancelled,
    /// A fatal error aborted the run (the trajectory is partial).
    Crashed,
}

impl FinishReason {
    /// Stable string form used in logs and stored documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Terminal => "terminal",
            FinishReason::Exhausted => "exhausted",
            FinishReason::Cancelled => "cancelled",
            FinishReason::Crashed => "crashed",
        }
    }
}

/// How a step's execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The step completed without error.
    None,
    /// The step failed but the loop continues (tool errors, user-code
    /// exceptions, terminal-payload validation failures).
    Recoverable,
    /// The step ended the run (driver crash).
    Terminal,
}

/// One step of the REPL loop: reasoning text, emitted code, captured
/// output, and an error tag. Entries are append-only within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationEntry {
    /// Zero-based step index.
    pub index: u32,
    /// The model's reasoning text preceding the code block.
    pub reasoning: String,
    /// The code that was executed (empty if the model emitted none).
    pub code: String,
    /// Captured output, size-bounded by the interpreter.
    pub output: String,
    /// How the step ended.
    pub error_class: ErrorClass,
    /// Verification feedback, present when the step executed SPARQL
    /// and verification is enabled.
    pub feedback: Option<String>,
    /// When the step completed.
    pub at: DateTime<Utc>,
}

impl IterationEntry {
    /// Whether this step executed a SPARQL tool.
    pub fn executed_sparql(&self) -> bool {
        self.feedback.is_some()
            || self.code.contains("sparql_local")
            || self.code.contains("sparql_remote")
    }
}

/// The full ordered record of one driver invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// This trajectory's id.
    pub trajectory_id: TrajectoryId,
    /// The run this trajectory belongs to.
    pub run_id: RunId,
    /// The input query.
    pub query: String,
    /// The rendered context injected alongside the query.
    pub context: String,
    /// Ordered iteration entries.
    pub entries: Vec<IterationEntry>,
    /// The final typed output, if one was produced.
    pub final_output: Option<serde_json::Value>,
    /// Whether the final output came from the extract fallback rather
    /// than a terminal call.
    pub extracted: bool,
    /// Whether the run converged (terminal call within budget).
    pub converged: bool,
    /// Why the run stopped (None while still in flight).
    pub finish: Option<FinishReason>,
    /// When the run started.
    pub created_at: DateTime<Utc>,
}

impl Trajectory {
    /// Start an empty trajectory for a run.
    pub fn new(run_id: RunId, query: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            trajectory_id: TrajectoryId::mint(),
            run_id,
            query: query.into(),
            context: context.into(),
            entries: Vec::new(),
            final_output: None,
            extracted: false,
            converged: false,
            finish: None,
            created_at: Utc::now(),
        }
    }

    /// Number of iterations recorded.
    pub fn iteration_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// The bounded artifact handed to the judge and extractor: the first
    /// and last entries plus every entry that executed SPARQL, each capped
    /// at `per_entry` chars of output.
    pub fn artifact(&self, per_entry: usize) -> String {
        let mut picked: Vec<&IterationEntry> = Vec::new();
        let last = self.entries.len().saturating_sub(1);
        for (i, entry) in self.entries.iter().enumerate() {
            if i == 0 || i == last || entry.executed_sparql() {
                picked.push(entry);
            }
        }
        let mut out = String::new();
        out.push_str(&format!("QUERY: {}\n", self.query));
        for entry in picked {
            out.push_str(&format!("--- step {} ---\n", entry.index));
            out.push_str(&format!("CODE:\n{}\n", clip(&entry.code, per_entry)));
            out.push_str(&format!("OUTPUT:\n{}\n", clip(&entry.output, per_entry)));
            if let Some(fb) = &entry.feedback {
                out.push_str(&format!("FEEDBACK:\n{}\n", clip(fb, per_entry)));
            }
        }
        if let Some(final_output) = &self.final_output {
            out.push_str(&format!("FINAL: {final_output}\n"));
        }
        out
    }
}

fn clip(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u32, code: &str, feedback: Option<&str>) -> IterationEntry {
        IterationEntry {
            index,
            reasoning: String::new(),
            code: code.into(),
            output: format!("out{index}"),
            error_class: ErrorClass::None,
            feedback: feedback.map(Into::into),
            at: Utc::now(),
        }
    }

    #[test]
    fn sparql_detection() {
        assert!(entry(0, "h = sparql_local(\"SELECT\", name=\"x\")", None).executed_sparql());
        assert!(entry(0, "print(1)", Some("✓ ok")).executed_sparql());
        assert!(!entry(0, "print(1)", None).executed_sparql());
    }

    #[test]
    fn artifact_picks_first_last_and_sparql() {
        let mut t = Trajectory::new(RunId::new("r"), "q", "");
        t.entries.push(entry(0, "print(1)", None));
        t.entries.push(entry(1, "print(2)", None));
        t.entries.push(entry(2, "sparql_local(\"S\", name=\"h\")", None));
        t.entries.push(entry(3, "print(3)", None));
        t.entries.push(entry(4, "print(4)", None));
        let artifact = t.artifact(1000);
        assert!(artifact.contains("step 0"));
        assert!(artifact.contains("step 2"));
        assert!(artifact.contains("step 4"));
        assert!(!artifact.contains("step 1"));
        assert!(!artifact.contains("step 3"));
    }

    #[test]
    fn artifact_clips_entry_output() {
        let mut t = Trajectory::new(RunId::new("r"), "q", "");
        let mut long = entry(0, "print(1)", None);
        long.output = "x".repeat(500);
        t.entries.push(long);
        let artifact = t.artifact(100);
        assert!(!artifact.contains(&"x".repeat(101)));
        assert!(artifact.contains(&"x".repeat(100)));
    }

    #[test]
    fn finish_reason_string_forms() {
        assert_eq!(FinishReason::Cancelled.as_str(), "cancelled");
        assert_eq!(
            serde_json::to_string(&FinishReason::Exhausted).unwrap(),
            "\"exhausted\""
        );
    }

    #[test]
    fn new_trajectory_is_unfinished() {
        let t = Trajectory::new(RunId::new("r"), "q", "");
        assert!(t.finish.is_none());
        assert!(!t.converged);
        assert!(t.trajectory_id.as_str().starts_with("traj-"));
    }

    #[test]
    fn iteration_count_matches_entries() {
        let mut t = Trajectory::new(RunId::new("r"), "q", "");
        assert_eq!(t.iteration_count(), 0);
        t.entries.push(entry(0, "", None));
        t.entries.push(entry(1, "", None));
        assert_eq!(t.iteration_count(), 2);
    }
}
