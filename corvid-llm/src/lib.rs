#![deny(missing_docs)]
//! Chat provider seam for corvid.
//!
//! The [`ChatProvider`] trait uses RPITIT (return-position `impl Trait` in
//! traits) and is intentionally NOT object-safe — drivers are generic over
//! it. Places that must store a provider as a value (the sub-LLM handle
//! inside the tool surface) use [`SharedChatProvider`], the type-erased
//! boundary.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How a chat completion can fail, from the driver's point of view.
///
/// The taxonomy is split along one line that matters to the loop:
/// *transient* failures (the wire, or the provider asking us to slow
/// down) are worth the bounded retry budget, everything else will fail
/// identically on the next attempt and should surface immediately.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced an HTTP response: connection refused,
    /// DNS, TLS, or a mid-stream drop. Also covers request timeouts.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider is shedding load (HTTP 429). Carries the
    /// `Retry-After` delay when the provider sent one, so the retry
    /// loop can honour it instead of guessing.
    #[error("throttled by provider")]
    Throttled {
        /// Provider-suggested wait before the next attempt.
        retry_after: Option<Duration>,
    },

    /// The credentials were rejected (HTTP 401/403). Retrying with the
    /// same key cannot help.
    #[error("credentials rejected: {0}")]
    BadCredentials(String),

    /// The provider does not serve the requested model id.
    #[error("unknown model `{0}`")]
    UnknownModel(String),

    /// The provider answered, but not with a usable completion —
    /// undecodable body, an empty choice list, a refused request.
    #[error("unusable completion: {0}")]
    UnusableCompletion(String),

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether the driver's bounded retry loop should spend an attempt
    /// on this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_) | ProviderError::Throttled { .. }
        )
    }

    /// The wait the provider asked for, if it asked for one.
    pub fn suggested_backoff(&self) -> Option<Duration> {
        match self {
            ProviderError::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System message (instructions).
    System,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The author role.
    pub role: ChatRole,
    /// The text content.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use (None = provider default).
    pub model: Option<String>,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Stop sequences.
    #[serde(default)]
    pub stop: Vec<String>,
}

impl ChatRequest {
    /// A request with just messages; everything else defaulted.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            model: None,
            messages,
            max_tokens: None,
            temperature: None,
            stop: Vec::new(),
        }
    }
}

/// Token usage from a single provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
}

/// Response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The completion text.
    pub content: String,
    /// Actual model used.
    pub model: String,
    /// Token usage.
    pub usage: TokenUsage,
}

/// The completion seam both model tiers go through.
///
/// corvid talks to two models per run — the root model driving the
/// REPL and the sub-LLM behind `llm_query`, the judge, and the
/// extractor — and treats them identically at this boundary: one
/// rendered conversation in, one completion out. Implementations carry
/// their own transport and credentials; budgets and retries live with
/// the callers. RPITIT keeps the trait allocation-free for generic
/// callers (the driver); value-level holders wrap it in
/// [`SharedChatProvider`].
pub trait ChatProvider: Send + Sync {
    /// Produce one completion for the rendered conversation.
    fn complete(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, ProviderError>> + Send;
}

// --- Type erasure (RPITIT is not dyn-compatible) ---

type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ChatResponse, ProviderError>> + Send + 'a>>;

/// Dyn-compatible wrapper for [`ChatProvider`].
trait ErasedChatProvider: Send + Sync {
    fn erased_complete(&self, request: ChatRequest) -> CompletionFuture<'_>;
}

impl<P: ChatProvider> ErasedChatProvider for P {
    fn erased_complete(&self, request: ChatRequest) -> CompletionFuture<'_> {
        Box::pin(self.complete(request))
    }
}

/// A type-erased, cheaply-clonable chat provider.
///
/// Used where a provider must be stored as a value: the sub-LLM handle
/// captured by the delegation tools, and the judge/extractor backends.
#[derive(Clone)]
pub struct SharedChatProvider(Arc<dyn ErasedChatProvider>);

impl SharedChatProvider {
    /// Wrap any [`ChatProvider`].
    pub fn new<P: ChatProvider + 'static>(provider: P) -> Self {
        Self(Arc::new(provider))
    }
}

impl ChatProvider for SharedChatProvider {
    fn complete(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, ProviderError>> + Send {
        self.0.erased_complete(request)
    }
}

impl std::fmt::Debug for SharedChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedChatProvider")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_split_matches_retry_policy() {
        assert!(ProviderError::Transport("connection reset".into()).is_transient());
        assert!(ProviderError::Throttled { retry_after: None }.is_transient());
        assert!(!ProviderError::BadCredentials("revoked key".into()).is_transient());
        assert!(!ProviderError::UnknownModel("gpt-imaginary".into()).is_transient());
        assert!(!ProviderError::UnusableCompletion("empty choices".into()).is_transient());
    }

    #[test]
    fn throttled_carries_the_providers_wait() {
        let e = ProviderError::Throttled {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(e.suggested_backoff(), Some(Duration::from_secs(7)));
        assert_eq!(
            ProviderError::Transport("x".into()).suggested_backoff(),
            None
        );
    }

    #[test]
    fn unknown_model_names_the_model() {
        assert_eq!(
            ProviderError::UnknownModel("tiny-9b".into()).to_string(),
            "unknown model `tiny-9b`"
        );
    }

    #[test]
    fn chat_role_serde() {
        assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
    }

    struct Fixed(&'static str);

    impl ChatProvider for Fixed {
        fn complete(
            &self,
            _request: ChatRequest,
        ) -> impl Future<Output = Result<ChatResponse, ProviderError>> + Send {
            let content = self.0.to_string();
            async move {
                Ok(ChatResponse {
                    content,
                    model: "fixed".into(),
                    usage: TokenUsage::default(),
                })
            }
        }
    }

    #[tokio::test]
    async fn shared_provider_erases() {
        let shared = SharedChatProvider::new(Fixed("hello"));
        let response = shared
            .complete(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
        // Clones share the same backend.
        let clone = shared.clone();
        let response = clone
            .complete(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
    }
}
