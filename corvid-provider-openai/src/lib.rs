#![deny(missing_docs)]
//! OpenAI-compatible chat provider for corvid-llm.
//!
//! Implements [`corvid_llm::ChatProvider`] for the Chat Completions API.
//! The corvid REPL protocol is textual, so this provider maps plain
//! messages only — no native tool-calling surface.

mod types;

use corvid_llm::{ChatProvider, ChatRequest, ChatResponse, ChatRole, ProviderError, TokenUsage};
use types::*;

/// OpenAI-compatible chat provider.
pub struct OpenAiProvider {
    api_key: String,
    client: reqwest::Client,
    api_url: String,
    default_model: String,
    org_id: Option<String>,
}

impl OpenAiProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            default_model: "gpt-4o-mini".into(),
            org_id: None,
        }
    }

    /// Override the API URL (for testing, proxies, or compatible servers).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Override the default model used when the request leaves it unset.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the OpenAI-Organization header for multi-org accounts.
    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Set a per-request timeout. Expiry surfaces as a transient
    /// `Transport` failure, so the driver's retry budget applies.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    fn build_request(&self, request: &ChatRequest) -> ApiRequest {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let messages = request
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                }
                .into(),
                content: m.content.clone(),
            })
            .collect();
        ApiRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: if request.stop.is_empty() {
                None
            } else {
                Some(request.stop.clone())
            },
        }
    }

    fn parse_response(&self, response: ApiResponse) -> Result<ChatResponse, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::UnusableCompletion("no choices in response".into()))?;
        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            model: response.model,
            usage: TokenUsage {
                input_tokens: response.usage.prompt_tokens,
                output_tokens: response.usage.completion_tokens,
            },
        })
    }
}

impl ChatProvider for OpenAiProvider {
    fn complete(
        &self,
        request: ChatRequest,
    ) -> impl std::future::Future<Output = Result<ChatResponse, ProviderError>> + Send {
        let api_request = self.build_request(&request);
        let model = api_request.model.clone();
        let mut http_request = self
            .client
            .post(&self.api_url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");

        if let Some(ref org_id) = self.org_id {
            http_request = http_request.header("openai-organization", org_id);
        }

        let http_request = http_request.json(&api_request);

        async move {
            let http_response = http_request
                .send()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;

            let status = http_response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::Throttled {
                    retry_after: retry_after_header(&http_response),
                });
            }
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                let body = http_response.text().await.unwrap_or_default();
                return Err(ProviderError::BadCredentials(body));
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ProviderError::UnknownModel(model));
            }
            if status.is_server_error() {
                let body = http_response.text().await.unwrap_or_default();
                return Err(ProviderError::Transport(format!("HTTP {status}: {body}")));
            }
            if !status.is_success() {
                let body = http_response.text().await.unwrap_or_default();
                return Err(ProviderError::UnusableCompletion(format!(
                    "HTTP {status}: {body}"
                )));
            }

            let api_response: ApiResponse = http_response
                .json()
                .await
                .map_err(|e| ProviderError::UnusableCompletion(e.to_string()))?;

            self.parse_response(api_response)
        }
    }
}

/// Parse a seconds-valued `Retry-After` header, if present.
fn retry_after_header(response: &reqwest::Response) -> Option<std::time::Duration> {
    response
        .headers()
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_llm::ChatMessage;

    #[test]
    fn build_request_maps_roles_and_model() {
        let provider = OpenAiProvider::new("k").with_model("test-model");
        let request = ChatRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        let api = provider.build_request(&request);
        assert_eq!(api.model, "test-model");
        assert_eq!(api.messages.len(), 3);
        assert_eq!(api.messages[0].role, "system");
        assert_eq!(api.messages[1].role, "user");
        assert_eq!(api.messages[2].role, "assistant");
        assert!(api.stop.is_none());
    }

    #[test]
    fn explicit_model_wins_over_default() {
        let provider = OpenAiProvider::new("k").with_model("default-model");
        let mut request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        request.model = Some("explicit".into());
        assert_eq!(provider.build_request(&request).model, "explicit");
    }

    #[test]
    fn stop_sequences_pass_through() {
        let provider = OpenAiProvider::new("k");
        let mut request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        request.stop = vec!["```\n".into()];
        assert_eq!(
            provider.build_request(&request).stop,
            Some(vec!["```\n".to_string()])
        );
    }

    #[test]
    fn parse_response_takes_first_choice() {
        let provider = OpenAiProvider::new("k");
        let api: ApiResponse = serde_json::from_str(
            r#"{
                "model": "m",
                "choices": [{"message": {"role": "assistant", "content": "hi"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5}
            }"#,
        )
        .unwrap();
        let response = provider.parse_response(api).unwrap();
        assert_eq!(response.content, "hi");
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[test]
    fn parse_response_no_choices_is_unusable() {
        let provider = OpenAiProvider::new("k");
        let api: ApiResponse = serde_json::from_str(
            r#"{"model": "m", "choices": [], "usage": {"prompt_tokens": 0, "completion_tokens": 0}}"#,
        )
        .unwrap();
        assert!(matches!(
            provider.parse_response(api),
            Err(ProviderError::UnusableCompletion(_))
        ));
    }
}
