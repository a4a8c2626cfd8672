//! Runner configuration.

use corvid_graph::MetaConfig;

/// Configuration for a [`crate::Runner`]. Every knob of the caller-facing
/// entry point lives here; the defaults match the documented contract.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Root model identifier override.
    pub model: Option<String>,
    /// Memory items retrieved per run.
    pub retrieve_k: usize,
    /// Whether to extract memories after the run.
    pub extract_memories: bool,
    /// REPL iteration budget.
    pub max_iterations: u32,
    /// Sub-LLM call budget per run.
    pub max_llm_calls: u32,
    /// Cap on captured output per step, in chars.
    pub output_truncation_limit: usize,
    /// Whether the verification injector reviews SPARQL executions.
    pub enable_verification: bool,
    /// Whether `sparql_remote` is exposed into the REPL.
    pub allow_remote_endpoints: bool,
    /// Graph metadata derivation (label predicates, default prefix).
    pub meta: MetaConfig,
    /// Run a cross-trajectory meta-analysis every N runs (None = off).
    pub meta_analysis_every: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            model: None,
            retrieve_k: 3,
            extract_memories: true,
            max_iterations: 15,
            max_llm_calls: 50,
            output_truncation_limit: 10_000,
            enable_verification: true,
            allow_remote_endpoints: false,
            meta: MetaConfig::default(),
            meta_analysis_every: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = RunnerConfig::default();
        assert_eq!(config.retrieve_k, 3);
        assert!(config.extract_memories);
        assert_eq!(config.max_iterations, 15);
        assert_eq!(config.max_llm_calls, 50);
        assert_eq!(config.output_truncation_limit, 10_000);
        assert!(config.enable_verification);
        assert!(!config.allow_remote_endpoints);
    }
}
