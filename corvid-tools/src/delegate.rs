//! Sub-LLM delegation under a per-run call budget.

use crate::args::ToolArgs;
use crate::bound::{bound, PREVIEW_BUDGET};
use crate::error::{ToolError, ToolErrorKind};
use crate::registry::ToolDyn;
use corvid_llm::{ChatMessage, ChatProvider, ChatRequest, SharedChatProvider};
use futures_util::future::join_all;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// The per-run sub-LLM call budget, decremented per call.
///
/// The budget is modelled as an atomic counter captured by the
/// delegation tools' closures; the driver only sets the initial value.
pub struct CallBudget {
    remaining: AtomicI64,
}

impl CallBudget {
    /// A budget of `n` calls.
    pub fn new(n: u32) -> Self {
        Self {
            remaining: AtomicI64::new(n as i64),
        }
    }

    /// Try to spend one call. `false` means the budget is depleted.
    pub fn try_acquire(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::SeqCst) > 0
    }

    /// Calls left (never negative).
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst).max(0) as u32
    }
}

fn depleted() -> ToolError {
    ToolError::new(
        ToolErrorKind::BudgetExhausted,
        "the sub-LLM call budget is depleted",
        "proceed without delegation; summarize what you already have",
    )
}

async fn ask(
    provider: &SharedChatProvider,
    prompt: String,
    context: String,
) -> Result<String, ToolError> {
    let mut messages = Vec::new();
    if !context.is_empty() {
        messages.push(ChatMessage::system(context));
    }
    messages.push(ChatMessage::user(prompt));
    let response = provider
        .complete(ChatRequest::new(messages))
        .await
        .map_err(|e| {
            ToolError::new(
                ToolErrorKind::Internal,
                format!("sub-LLM call failed: {e}"),
                "retry once, or proceed without delegation",
            )
        })?;
    Ok(bound(&response.content, PREVIEW_BUDGET * 4))
}

/// `llm_query(prompt, context="")` — one budgeted sub-LLM call.
pub struct LlmQueryTool {
    provider: SharedChatProvider,
    budget: Arc<CallBudget>,
}

impl LlmQueryTool {
    /// Build over the shared sub-LLM and budget.
    pub fn new(provider: SharedChatProvider, budget: Arc<CallBudget>) -> Self {
        Self { provider, budget }
    }
}

impl ToolDyn for LlmQueryTool {
    fn name(&self) -> &str {
        "llm_query"
    }
    fn summary(&self) -> &str {
        "Delegate one question to the sub-LLM (budgeted)."
    }
    fn signature(&self) -> &str {
        "llm_query(prompt, context=\"\")"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let prompt = args.require_str(0, "prompt")?.to_string();
            let context = args.opt_str(1, "context")?.unwrap_or("").to_string();
            if !self.budget.try_acquire() {
                return Err(depleted());
            }
            let answer = ask(&self.provider, prompt, context).await?;
            Ok(json!(answer))
        })
    }
}

/// `llm_query_batched([prompts])` — parallel variant, order-preserving.
pub struct LlmQueryBatchedTool {
    provider: SharedChatProvider,
    budget: Arc<CallBudget>,
}

impl LlmQueryBatchedTool {
    /// Build over the shared sub-LLM and budget.
    pub fn new(provider: SharedChatProvider, budget: Arc<CallBudget>) -> Self {
        Self { provider, budget }
    }
}

impl ToolDyn for LlmQueryBatchedTool {
    fn name(&self) -> &str {
        "llm_query_batched"
    }
    fn summary(&self) -> &str {
        "Delegate several questions to the sub-LLM in parallel (budgeted)."
    }
    fn signature(&self) -> &str {
        "llm_query_batched(prompts)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let prompts = args.require_str_list(0, "prompts")?;
            // Each prompt costs one call; acquire up front so a batch
            // cannot overshoot the budget mid-flight.
            for _ in &prompts {
                if !self.budget.try_acquire() {
                    return Err(depleted());
                }
            }
            let futures = prompts
                .into_iter()
                .map(|prompt| ask(&self.provider, prompt, String::new()));
            let answers: Result<Vec<String>, ToolError> =
                join_all(futures).await.into_iter().collect();
            Ok(json!(answers?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_llm::{ChatProvider, ChatResponse, ProviderError, TokenUsage};

    struct EchoProvider;

    impl ChatProvider for EchoProvider {
        fn complete(
            &self,
            request: ChatRequest,
        ) -> impl Future<Output = Result<ChatResponse, ProviderError>> + Send {
            let text = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            async move {
                Ok(ChatResponse {
                    content: format!("echo: {text}"),
                    model: "mock".into(),
                    usage: TokenUsage::default(),
                })
            }
        }
    }

    #[test]
    fn budget_counts_down() {
        let budget = CallBudget::new(2);
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
        assert_eq!(budget.remaining(), 0);
    }

    #[tokio::test]
    async fn llm_query_spends_budget() {
        let tool = LlmQueryTool::new(
            SharedChatProvider::new(EchoProvider),
            Arc::new(CallBudget::new(1)),
        );
        let out = tool
            .call(ToolArgs::new(vec![json!("hi")], Default::default()))
            .await
            .unwrap();
        assert_eq!(out, json!("echo: hi"));
        let e = tool
            .call(ToolArgs::new(vec![json!("again")], Default::default()))
            .await
            .unwrap_err();
        assert_eq!(e.kind, ToolErrorKind::BudgetExhausted);
    }

    #[tokio::test]
    async fn zero_budget_rejects_immediately() {
        let tool = LlmQueryTool::new(
            SharedChatProvider::new(EchoProvider),
            Arc::new(CallBudget::new(0)),
        );
        let e = tool
            .call(ToolArgs::new(vec![json!("hi")], Default::default()))
            .await
            .unwrap_err();
        assert_eq!(e.kind, ToolErrorKind::BudgetExhausted);
    }

    #[tokio::test]
    async fn batched_preserves_order() {
        let tool = LlmQueryBatchedTool::new(
            SharedChatProvider::new(EchoProvider),
            Arc::new(CallBudget::new(10)),
        );
        let out = tool
            .call(ToolArgs::new(
                vec![json!(["one", "two", "three"])],
                Default::default(),
            ))
            .await
            .unwrap();
        assert_eq!(out, json!(["echo: one", "echo: two", "echo: three"]));
    }

    #[tokio::test]
    async fn batched_respects_budget() {
        let tool = LlmQueryBatchedTool::new(
            SharedChatProvider::new(EchoProvider),
            Arc::new(CallBudget::new(2)),
        );
        let e = tool
            .call(ToolArgs::new(
                vec![json!(["a", "b", "c"])],
                Default::default(),
            ))
            .await
            .unwrap_err();
        assert_eq!(e.kind, ToolErrorKind::BudgetExhausted);
    }
}
