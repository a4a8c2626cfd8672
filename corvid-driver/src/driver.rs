//! The iteration loop.

use crate::config::DriverConfig;
use crate::parse::{extract_json_object, parse_response};
use crate::prompt::{render_system, render_user};
use corvid_core::{
    DriverError, ErrorClass, FieldKind, FinishReason, IterationEntry, Prediction, RunId,
    Signature, Trajectory,
};
use corvid_llm::{ChatMessage, ChatProvider, ChatRequest, ChatResponse};
use corvid_repl::{ExecutionOutcome, Interpreter};
use corvid_tools::ToolRegistry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The RLM iteration driver.
///
/// Owns the per-run interpreter; generic over the root-model provider
/// (RPITIT, so not object-safe — the caller-facing boundary is the
/// runner, not this type).
pub struct RlmDriver<P: ChatProvider> {
    provider: P,
    tools: Arc<ToolRegistry>,
    interpreter: Interpreter,
    signature: Signature,
    config: DriverConfig,
    partial: Option<Trajectory>,
}

impl<P: ChatProvider> RlmDriver<P> {
    /// Build a driver for one run.
    pub fn new(
        provider: P,
        tools: Arc<ToolRegistry>,
        interpreter: Interpreter,
        signature: Signature,
        config: DriverConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            interpreter,
            signature,
            config,
            partial: None,
        }
    }

    /// The partial trajectory of a run that ended in a fatal error, so
    /// the caller can persist it before propagating the error.
    pub fn take_partial(&mut self) -> Option<Trajectory> {
        self.partial.take()
    }

    /// Run the loop to a validated terminal payload or a best-effort
    /// fallback. The returned prediction's `reason` says how the run
    /// stopped (terminal, exhausted, cancelled); `converged` is true
    /// only for terminal.
    pub async fn run(
        &mut self,
        run_id: RunId,
        inputs: BTreeMap<String, Value>,
        cancel: Option<CancellationToken>,
    ) -> Result<Prediction, DriverError> {
        let query = string_field(&inputs, "query");
        let context = string_field(&inputs, "context");
        let mut trajectory = Trajectory::new(run_id, query, context);
        self.interpreter.start();

        let system = render_system(&self.signature, &self.tools);
        let mut discarded_note = false;
        let mut empty_streak = 0u32;

        while trajectory.iteration_count() < self.config.max_iterations {
            if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                tracing::info!("run cancelled between steps");
                return Ok(self.finish(trajectory, BTreeMap::new(), FinishReason::Cancelled));
            }

            let user = render_user(
                &self.signature,
                &inputs,
                &trajectory.entries,
                &self.config,
                discarded_note,
            );
            discarded_note = false;

            let response = match self
                .complete_with_retry(vec![
                    ChatMessage::system(system.clone()),
                    ChatMessage::user(user),
                ])
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    trajectory.finish = Some(FinishReason::Crashed);
                    self.partial = Some(trajectory);
                    return Err(e);
                }
            };
            let parsed = parse_response(&response.content);
            if parsed.discarded_blocks > 0 {
                discarded_note = true;
            }

            let index = trajectory.iteration_count();
            tracing::debug!(step = index, code_len = parsed.code.len(), "iteration");

            if parsed.code.is_empty() {
                trajectory.entries.push(entry(
                    index,
                    parsed.reasoning,
                    String::new(),
                    String::new(),
                    ErrorClass::None,
                ));
                empty_streak += 1;
                // Two code-less replies in a row is a soft failure.
                if empty_streak >= 2 {
                    break;
                }
                continue;
            }
            empty_streak = 0;

            let outcome = self
                .interpreter
                .execute(&parsed.code, inputs.clone())
                .await;
            match outcome {
                ExecutionOutcome::Terminal(payload) => {
                    let violations = self.signature.validate(&payload);
                    if violations.is_empty() {
                        trajectory.entries.push(entry(
                            index,
                            parsed.reasoning,
                            parsed.code,
                            String::new(),
                            ErrorClass::None,
                        ));
                        trajectory.final_output =
                            Some(Value::Object(payload.clone().into_iter().collect()));
                        trajectory.converged = true;
                        tracing::info!(
                            iterations = trajectory.iteration_count(),
                            "run converged"
                        );
                        return Ok(self.finish(trajectory, payload, FinishReason::Terminal));
                    }
                    let output = format!("[ValidationError] {}", violations.join("; "));
                    trajectory.entries.push(entry(
                        index,
                        parsed.reasoning,
                        parsed.code,
                        output,
                        ErrorClass::Recoverable,
                    ));
                }
                ExecutionOutcome::Text(output) => {
                    let feedback = extract_feedback(&output);
                    let mut e = entry(index, parsed.reasoning, parsed.code, output, ErrorClass::None);
                    e.feedback = feedback;
                    trajectory.entries.push(e);
                }
                ExecutionOutcome::RecoverableError { .. } => {
                    let output = outcome.as_step_output();
                    trajectory.entries.push(entry(
                        index,
                        parsed.reasoning,
                        parsed.code,
                        output,
                        ErrorClass::Recoverable,
                    ));
                }
            }
        }

        self.extract_fallback(trajectory, &inputs).await
    }

    /// One additional completion shown the full trajectory, asked for
    /// the terminal payload directly. Always yields a prediction with a
    /// non-empty primary field; `converged` stays false.
    async fn extract_fallback(
        &mut self,
        mut trajectory: Trajectory,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<Prediction, DriverError> {
        tracing::info!(
            iterations = trajectory.iteration_count(),
            "budget exhausted, extract fallback"
        );
        let fields: Vec<String> = self
            .signature
            .outputs
            .iter()
            .map(|f| {
                format!(
                    "\"{}\" ({})",
                    f.name,
                    match f.kind {
                        FieldKind::Text => "string",
                        FieldKind::Mapping => "object",
                    }
                )
            })
            .collect();
        let mut prompt = format!(
            "The interactive budget is exhausted. Based on the trajectory below, emit ONLY a \
             JSON object with fields: {}.\n\n",
            fields.join(", ")
        );
        prompt.push_str(&format!("QUERY: {}\n\nTRAJECTORY:\n", string_field(inputs, "query")));
        for e in &trajectory.entries {
            prompt.push_str(&format!(
                "--- step {} ---\nCODE:\n{}\nOUTPUT:\n{}\n",
                e.index,
                clip(&e.code, 500),
                clip(&e.output, 500)
            ));
        }

        let response = match self
            .complete_with_retry(vec![ChatMessage::user(prompt)])
            .await
        {
            Ok(response) => response,
            Err(e) => {
                trajectory.finish = Some(FinishReason::Crashed);
                self.partial = Some(trajectory);
                return Err(e);
            }
        };

        let payload = extract_json_object(&response.content)
            .and_then(|value| {
                let map: BTreeMap<String, Value> = value.as_object()?.clone().into_iter().collect();
                self.signature.validate(&map).is_empty().then_some(map)
            })
            .unwrap_or_else(|| self.best_effort_payload(&response.content));

        trajectory.extracted = true;
        trajectory.final_output = Some(Value::Object(payload.clone().into_iter().collect()));
        Ok(self.finish(trajectory, payload, FinishReason::Exhausted))
    }

    /// Degraded payload when even the fallback response does not
    /// validate: the raw response fills the first text field.
    fn best_effort_payload(&self, raw: &str) -> BTreeMap<String, Value> {
        let mut payload = BTreeMap::new();
        let mut first_text = true;
        for field in &self.signature.outputs {
            let value = match field.kind {
                FieldKind::Text if first_text => {
                    first_text = false;
                    Value::String(raw.trim().to_string())
                }
                FieldKind::Text => Value::String(String::new()),
                FieldKind::Mapping => Value::Object(serde_json::Map::new()),
            };
            payload.insert(field.name.clone(), value);
        }
        payload
    }

    fn finish(
        &mut self,
        mut trajectory: Trajectory,
        fields: BTreeMap<String, Value>,
        reason: FinishReason,
    ) -> Prediction {
        self.interpreter.shutdown();
        trajectory.finish = Some(reason);
        let iteration_count = trajectory.iteration_count();
        Prediction {
            fields,
            iteration_count,
            converged: reason == FinishReason::Terminal,
            reason,
            trajectory,
            retrieved: Vec::new(),
            stored: Vec::new(),
        }
    }

    async fn complete_with_retry(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatResponse, DriverError> {
        let mut attempt = 0u32;
        loop {
            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: messages.clone(),
                max_tokens: Some(self.config.max_tokens),
                temperature: self.config.temperature,
                stop: Vec::new(),
            };
            match self.provider.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    // A throttling provider names its own wait; take the
                    // longer of that and the exponential schedule.
                    let backoff = self.config.retry_backoff * 2u32.pow(attempt);
                    let backoff = e.suggested_backoff().unwrap_or(backoff).max(backoff);
                    tracing::warn!(attempt, error = %e, "provider error, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(DriverError::Provider(e.to_string())),
            }
        }
    }
}

fn entry(
    index: u32,
    reasoning: String,
    code: String,
    output: String,
    error_class: ErrorClass,
) -> IterationEntry {
    IterationEntry {
        index,
        reasoning,
        code,
        output,
        error_class,
        feedback: None,
        at: chrono::Utc::now(),
    }
}

fn string_field(inputs: &BTreeMap<String, Value>, name: &str) -> String {
    inputs
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Collect the verification block lines (✓/⚠/✗) out of a step output.
fn extract_feedback(output: &str) -> Option<String> {
    let lines: Vec<&str> = output
        .lines()
        .filter(|line| ['✓', '⚠', '✗'].iter().any(|m| line.contains(*m)))
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
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
    use corvid_llm::{ProviderError, TokenUsage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // -- Mock provider: queued responses, recorded requests --

    struct MockProvider {
        responses: Mutex<VecDeque<Result<String, ProviderError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(
                    responses.into_iter().map(|s| Ok(s.to_string())).collect(),
                ),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn with_results(responses: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatProvider for MockProvider {
        fn complete(
            &self,
            request: ChatRequest,
        ) -> impl std::future::Future<Output = Result<ChatResponse, ProviderError>> + Send
        {
            self.requests.lock().unwrap().push(request);
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("MockProvider: no more responses queued");
            async move {
                next.map(|content| ChatResponse {
                    content,
                    model: "mock".into(),
                    usage: TokenUsage::default(),
                })
            }
        }
    }

    fn driver(provider: MockProvider) -> RlmDriver<MockProvider> {
        driver_with_config(provider, DriverConfig::default())
    }

    fn driver_with_config(
        provider: MockProvider,
        config: DriverConfig,
    ) -> RlmDriver<MockProvider> {
        let tools = Arc::new(ToolRegistry::new());
        let interpreter = Interpreter::new(tools.clone());
        RlmDriver::new(provider, tools, interpreter, Signature::graph_qa(), {
            let mut c = config;
            c.retry_backoff = std::time::Duration::from_millis(1);
            c
        })
    }

    fn inputs() -> BTreeMap<String, Value> {
        [
            ("query".to_string(), Value::String("What is Activity?".into())),
            ("context".to_string(), Value::String(String::new())),
        ]
        .into()
    }

    const SUBMIT: &str = "Done.\n```\nSUBMIT(answer=\"An Activity is something that occurs.\", \
                          sparql=\"\", evidence={\"class\": \"prov:Activity\"})\n```";

    #[tokio::test]
    async fn converges_on_first_submit() {
        let mut d = driver(MockProvider::new(vec![SUBMIT]));
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(prediction.converged);
        assert_eq!(prediction.reason, FinishReason::Terminal);
        assert_eq!(prediction.iteration_count, 1);
        assert!(prediction.text("answer").contains("occurs"));
        assert!(prediction.trajectory.converged);
        assert_eq!(prediction.trajectory.finish, Some(FinishReason::Terminal));
        assert_eq!(
            prediction.trajectory.iteration_count(),
            prediction.trajectory.entries.len() as u32
        );
    }

    #[tokio::test]
    async fn recoverable_error_then_submit() {
        let mut d = driver(MockProvider::new(vec![
            "Try this.\n```\nprint(undefined_var)\n```",
            SUBMIT,
        ]));
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(prediction.converged);
        assert_eq!(prediction.iteration_count, 2);
        assert_eq!(
            prediction.trajectory.entries[0].error_class,
            ErrorClass::Recoverable
        );
        assert!(prediction.trajectory.entries[0]
            .output
            .contains("NameError"));
    }

    #[tokio::test]
    async fn invalid_terminal_payload_is_recoverable() {
        let mut d = driver(MockProvider::new(vec![
            "```\nSUBMIT(answer=\"only answer\")\n```",
            SUBMIT,
        ]));
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(prediction.converged);
        assert!(prediction.trajectory.entries[0]
            .output
            .contains("[ValidationError]"));
    }

    #[tokio::test]
    async fn budget_exhaustion_triggers_fallback_once() {
        let provider = MockProvider::new(vec![
            "```\nprint(1)\n```",
            "```\nprint(2)\n```",
            "{\"answer\": \"best effort\", \"sparql\": \"\", \"evidence\": {}}",
        ]);
        let mut d = driver_with_config(
            provider,
            DriverConfig {
                max_iterations: 2,
                ..DriverConfig::default()
            },
        );
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(!prediction.converged);
        assert_eq!(prediction.reason, FinishReason::Exhausted);
        assert_eq!(prediction.iteration_count, 2);
        assert_eq!(prediction.text("answer"), "best effort");
        assert!(prediction.trajectory.extracted);
    }

    #[tokio::test]
    async fn iteration_budget_one_means_one_loop_call() {
        let provider = MockProvider::new(vec![
            "```\nprint(1)\n```",
            "{\"answer\": \"from fallback\", \"sparql\": \"\", \"evidence\": {}}",
        ]);
        let mut d = driver_with_config(
            provider,
            DriverConfig {
                max_iterations: 1,
                ..DriverConfig::default()
            },
        );
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(!prediction.converged);
        // One loop call + one fallback call, nothing else.
        assert_eq!(prediction.iteration_count, 1);
    }

    #[tokio::test]
    async fn garbage_fallback_still_yields_answer() {
        let provider = MockProvider::new(vec![
            "```\nprint(1)\n```",
            "I cannot produce JSON, sorry.",
        ]);
        let mut d = driver_with_config(
            provider,
            DriverConfig {
                max_iterations: 1,
                ..DriverConfig::default()
            },
        );
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(!prediction.converged);
        assert!(!prediction.text("answer").is_empty());
        assert_eq!(prediction.fields["evidence"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn two_empty_replies_trigger_fallback() {
        let provider = MockProvider::new(vec![
            "Thinking without code.",
            "Still no code.",
            "{\"answer\": \"gave up\", \"sparql\": \"\", \"evidence\": {}}",
        ]);
        let mut d = driver(provider);
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(!prediction.converged);
        assert_eq!(prediction.iteration_count, 2);
        assert_eq!(prediction.text("answer"), "gave up");
    }

    #[tokio::test]
    async fn extra_code_blocks_noted_next_step() {
        let provider = MockProvider::new(vec![
            "```\nprint(1)\n```\n```\nprint(2)\n```",
            SUBMIT,
        ]);
        let mut d = driver(provider);
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(prediction.converged);
        let requests = d.provider.requests.lock().unwrap();
        let second_user = &requests[1].messages.last().unwrap().content;
        assert!(second_user.contains("only the first was"));
    }

    #[tokio::test]
    async fn retryable_errors_are_retried() {
        let provider = MockProvider::with_results(vec![
            Err(ProviderError::Throttled { retry_after: None }),
            Ok(SUBMIT.to_string()),
        ]);
        let mut d = driver(provider);
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        assert!(prediction.converged);
    }

    #[tokio::test]
    async fn persistent_provider_failure_is_fatal() {
        let provider = MockProvider::with_results(vec![
            Err(ProviderError::Throttled { retry_after: None }),
            Err(ProviderError::Throttled { retry_after: None }),
            Err(ProviderError::Throttled { retry_after: None }),
            Err(ProviderError::Throttled { retry_after: None }),
        ]);
        let mut d = driver_with_config(
            provider,
            DriverConfig {
                max_retries: 3,
                ..DriverConfig::default()
            },
        );
        let result = d.run(RunId::new("r"), inputs(), None).await;
        assert!(matches!(result, Err(DriverError::Provider(_))));
        // The partial trajectory survives for persistence, marked crashed.
        let partial = d.take_partial().unwrap();
        assert_eq!(partial.finish, Some(FinishReason::Crashed));
        assert!(d.take_partial().is_none());
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let provider = MockProvider::with_results(vec![Err(ProviderError::BadCredentials(
            "bad key".into(),
        ))]);
        let mut d = driver(provider);
        let result = d.run(RunId::new("r"), inputs(), None).await;
        assert!(matches!(result, Err(DriverError::Provider(_))));
    }

    #[tokio::test]
    async fn pre_cancelled_run_stops_before_first_call() {
        let provider = MockProvider::new(vec![]);
        let mut d = driver(provider);
        let token = CancellationToken::new();
        token.cancel();
        let prediction = d
            .run(RunId::new("r"), inputs(), Some(token))
            .await
            .unwrap();
        assert!(!prediction.converged);
        // The contract distinguishes cancellation from exhaustion.
        assert_eq!(prediction.reason, FinishReason::Cancelled);
        assert_eq!(prediction.trajectory.finish, Some(FinishReason::Cancelled));
        assert_eq!(prediction.iteration_count, 0);
        assert!(d.provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn feedback_lines_are_captured() {
        let provider = MockProvider::new(vec![
            // The snippet prints something that carries a feedback block.
            "```\nprint(\"verification:\")\nprint(\"✓ all prefixes resolve\")\n```",
            SUBMIT,
        ]);
        let mut d = driver(provider);
        let prediction = d.run(RunId::new("r"), inputs(), None).await.unwrap();
        let first = &prediction.trajectory.entries[0];
        assert_eq!(
            first.feedback.as_deref(),
            Some("✓ all prefixes resolve")
        );
    }
}
