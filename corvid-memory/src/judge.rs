//! Post-run judgment via a strict-JSON sub-LLM prompt.

use corvid_core::{Confidence, Judgment};
use corvid_llm::{ChatMessage, ChatProvider, ChatRequest, SharedChatProvider};
use serde_json::Value;

/// Locate the first JSON value (object or array) in free text: a fenced
/// block first, then a balanced span.
pub(crate) fn json_in_text(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = rest[body_start..].find("```") {
            let candidate = rest[body_start..body_start + end].trim();
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
    }
    // Try whichever bracket opens first, then the other.
    let mut openers = [('{', text.find('{')), ('[', text.find('['))];
    openers.sort_by_key(|(_, position)| position.unwrap_or(usize::MAX));
    for (opener, position) in openers {
        let closer = if opener == '{' { '}' } else { ']' };
        let Some(start) = position else {
            continue;
        };
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        for (i, c) in text[start..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                c if c == opener && !in_string => depth += 1,
                c if c == closer && !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        if let Ok(value) =
                            serde_json::from_str::<Value>(&text[start..start + i + 1])
                        {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// The trajectory judge.
pub struct Judge {
    provider: SharedChatProvider,
    model: Option<String>,
}

impl Judge {
    /// Build over a sub-LLM provider.
    pub fn new(provider: SharedChatProvider) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    /// Override the judge model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Judge one run. Parse failures default to the conservative
    /// verdict rather than erroring.
    pub async fn judge(&self, query: &str, final_output: &str, artifact: &str) -> Judgment {
        let prompt = format!(
            "Judge whether this agent run answered the user's question.\n\
             Respond with ONLY a JSON object:\n\
             {{\"is_success\": bool, \"reason\": \"short\", \
             \"confidence\": \"high\"|\"medium\"|\"low\", \"missing\": [\"tags\"]}}\n\n\
             QUESTION: {query}\n\nFINAL OUTPUT: {final_output}\n\nTRAJECTORY (bounded):\n{artifact}\n"
        );
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(512),
            temperature: Some(0.0),
            stop: Vec::new(),
        };
        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "judge call failed");
                return Judgment::parse_failed();
            }
        };
        parse_judgment(&response.content)
    }
}

fn parse_judgment(text: &str) -> Judgment {
    let Some(value) = json_in_text(text) else {
        return Judgment::parse_failed();
    };
    let Some(is_success) = value.get("is_success").and_then(Value::as_bool) else {
        return Judgment::parse_failed();
    };
    let confidence = match value.get("confidence").and_then(Value::as_str) {
        Some("high") => Confidence::High,
        Some("medium") => Confidence::Medium,
        _ => Confidence::Low,
    };
    Judgment {
        is_success,
        reason: value
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        confidence,
        missing: value
            .get("missing")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_llm::{ChatProvider, ChatResponse, ProviderError, TokenUsage};
    use std::future::Future;

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
                    model: "mock".into(),
                    usage: TokenUsage::default(),
                })
            }
        }
    }

    #[tokio::test]
    async fn parses_clean_json() {
        let judge = Judge::new(SharedChatProvider::new(Fixed(
            r#"{"is_success": true, "reason": "found the comment", "confidence": "high", "missing": []}"#,
        )));
        let judgment = judge.judge("q", "answer", "artifact").await;
        assert!(judgment.is_success);
        assert_eq!(judgment.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn parses_fenced_json_with_prose() {
        let judge = Judge::new(SharedChatProvider::new(Fixed(
            "Here is my verdict:\n```json\n{\"is_success\": false, \"reason\": \"no evidence\", \"confidence\": \"medium\", \"missing\": [\"evidence\"]}\n```",
        )));
        let judgment = judge.judge("q", "a", "t").await;
        assert!(!judgment.is_success);
        assert_eq!(judgment.missing, vec!["evidence"]);
    }

    #[tokio::test]
    async fn garbage_defaults_conservatively() {
        let judge = Judge::new(SharedChatProvider::new(Fixed("I think it went fine!")));
        let judgment = judge.judge("q", "a", "t").await;
        assert!(!judgment.is_success);
        assert_eq!(judgment.reason, "judgment-parse-failed");
        assert_eq!(judgment.confidence, Confidence::Low);
    }

    #[test]
    fn json_in_text_finds_arrays_too() {
        let value = json_in_text("items: [{\"a\": 1}] done").unwrap();
        assert!(value.is_array());
    }
}
