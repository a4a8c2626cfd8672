//! Driver configuration.

use std::time::Duration;

/// Static configuration for one [`crate::RlmDriver`] instance.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Model identifier override (None = provider default).
    pub model: Option<String>,
    /// Maximum REPL iterations before the extract fallback.
    pub max_iterations: u32,
    /// Maximum output tokens per completion.
    pub max_tokens: u32,
    /// Sampling temperature for the root model.
    pub temperature: Option<f64>,
    /// Steps that stay fully rendered in the history; older steps are
    /// compressed to a bounded prefix of their output.
    pub history_keep_full: usize,
    /// Chars of output kept for compressed history steps.
    pub history_compressed_chars: usize,
    /// Provider retries before a failure becomes fatal.
    pub max_retries: u32,
    /// Base backoff between retries (doubles per attempt).
    pub retry_backoff: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_iterations: 15,
            max_tokens: 2_048,
            temperature: Some(0.2),
            history_keep_full: 4,
            history_compressed_chars: 200,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = DriverConfig::default();
        assert_eq!(config.max_iterations, 15);
        assert_eq!(config.max_retries, 3);
    }
}
