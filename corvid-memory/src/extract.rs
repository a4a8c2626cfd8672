//! Memory extraction: 0–3 procedural drafts per judged trajectory.

use crate::judge::json_in_text;
use corvid_core::{Judgment, MemoryItem, MemoryScope, OntologyId, Provenance, SourceType};
use corvid_llm::{ChatMessage, ChatProvider, ChatRequest, SharedChatProvider};
use serde_json::Value;

/// Hard cap on drafts per run.
const MAX_DRAFTS: usize = 3;

/// The memory extractor.
pub struct Extractor {
    provider: SharedChatProvider,
    model: Option<String>,
}

impl Extractor {
    /// Build over a sub-LLM provider.
    pub fn new(provider: SharedChatProvider) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    /// Override the extractor model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Extract up to three memory items. Parse failures yield zero
    /// items, never an error.
    pub async fn extract(
        &self,
        query: &str,
        artifact: &str,
        judgment: &Judgment,
        ontology: Option<&OntologyId>,
        provenance: Provenance,
    ) -> Vec<MemoryItem> {
        let outcome = if judgment.is_success {
            "succeeded"
        } else {
            "failed"
        };
        let prompt = format!(
            "The agent run below {outcome} ({}). Extract up to 3 reusable procedural \
             memories: HOW to interact with the tools and result handles, not facts about \
             this ontology. Each must be transferable (no hard-coded identifiers unless \
             `transferable` is false) and bounded (title ≤120 chars, description ≤400, \
             content ≤4000).\n\
             Respond with ONLY a JSON array of objects:\n\
             [{{\"title\": str, \"description\": str, \"content\": str, \"tags\": [str], \
             \"task_types\": [str], \"tools\": [str], \"transferable\": bool}}]\n\
             An empty array is a valid answer.\n\n\
             QUESTION: {query}\n\nTRAJECTORY (bounded):\n{artifact}\n",
            judgment.reason
        );
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(1_500),
            temperature: Some(0.3),
            stop: Vec::new(),
        };
        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "extractor call failed");
                return Vec::new();
            }
        };
        let drafts = parse_drafts(&response.content);
        let source_type = if judgment.is_success {
            SourceType::Success
        } else {
            SourceType::Failure
        };
        drafts
            .into_iter()
            .take(MAX_DRAFTS)
            .map(|draft| {
                let scope = MemoryScope {
                    ontology: if draft.transferable {
                        None
                    } else {
                        ontology.cloned()
                    },
                    task_types: draft.task_types,
                    tools: draft.tools,
                    transferable: draft.transferable,
                };
                MemoryItem::new(draft.title, draft.description, draft.content, source_type, scope)
                    .with_tags(draft.tags)
                    .with_task_query(query)
                    .with_provenance(provenance.clone())
            })
            .collect()
    }
}

struct Draft {
    title: String,
    description: String,
    content: String,
    tags: Vec<String>,
    task_types: Vec<String>,
    tools: Vec<String>,
    transferable: bool,
}

fn parse_drafts(text: &str) -> Vec<Draft> {
    let Some(value) = json_in_text(text) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?.to_string();
            if title.trim().is_empty() {
                return None;
            }
            Some(Draft {
                title,
                description: str_field(item, "description"),
                content: str_field(item, "content"),
                tags: list_field(item, "tags"),
                task_types: list_field(item, "task_types"),
                tools: list_field(item, "tools"),
                transferable: item
                    .get("transferable")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            })
        })
        .collect()
}

fn str_field(value: &Value, name: &str) -> String {
    value
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn list_field(value: &Value, name: &str) -> Vec<String> {
    value
        .get(name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_core::Confidence;
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

    fn success() -> Judgment {
        Judgment {
            is_success: true,
            reason: "answered".into(),
            confidence: Confidence::High,
            missing: vec![],
        }
    }

    #[tokio::test]
    async fn extracts_typed_items() {
        let extractor = Extractor::new(SharedChatProvider::new(Fixed(
            r#"[{"title": "Search before describing", "description": "find ids first",
                "content": "call search_entity, then describe_entity on the top hit",
                "tags": ["entity-description"], "task_types": ["lookup"],
                "tools": ["search_entity", "describe_entity"], "transferable": true}]"#,
        )));
        let items = extractor
            .extract(
                "What is Activity?",
                "artifact",
                &success(),
                Some(&OntologyId::new("prov")),
                Provenance::default(),
            )
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_type, SourceType::Success);
        assert!(items[0].scope.transferable);
        assert!(items[0].scope.ontology.is_none());
        assert_eq!(items[0].tags, vec!["entity-description"]);
        assert_eq!(items[0].task_query.as_deref(), Some("What is Activity?"));
    }

    #[tokio::test]
    async fn non_transferable_pins_ontology() {
        let extractor = Extractor::new(SharedChatProvider::new(Fixed(
            r#"[{"title": "PROV labels live on rdfs:label", "description": "", "content": "c",
                "tags": [], "task_types": [], "tools": [], "transferable": false}]"#,
        )));
        let items = extractor
            .extract(
                "q",
                "a",
                &success(),
                Some(&OntologyId::new("prov")),
                Provenance::default(),
            )
            .await;
        assert_eq!(
            items[0].scope.ontology,
            Some(OntologyId::new("prov"))
        );
    }

    #[tokio::test]
    async fn failure_runs_produce_failure_items() {
        let extractor = Extractor::new(SharedChatProvider::new(Fixed(
            r#"[{"title": "Do not filter labels with CONTAINS", "description": "", "content": "c",
                "tags": [], "task_types": [], "tools": [], "transferable": true}]"#,
        )));
        let judgment = Judgment {
            is_success: false,
            reason: "wrong pattern".into(),
            confidence: Confidence::Medium,
            missing: vec![],
        };
        let items = extractor
            .extract("q", "a", &judgment, None, Provenance::default())
            .await;
        assert_eq!(items[0].source_type, SourceType::Failure);
    }

    #[tokio::test]
    async fn garbage_yields_zero_items() {
        let extractor = Extractor::new(SharedChatProvider::new(Fixed("no json at all")));
        assert!(extractor
            .extract("q", "a", &success(), None, Provenance::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn more_than_three_drafts_are_capped() {
        let extractor = Extractor::new(SharedChatProvider::new(Fixed(
            r#"[{"title": "a", "content": "c"}, {"title": "b", "content": "c"},
                {"title": "c", "content": "c"}, {"title": "d", "content": "c"}]"#,
        )));
        let items = extractor
            .extract("q", "a", &success(), None, Provenance::default())
            .await;
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn oversized_fields_are_clipped_not_dropped() {
        let response = format!(
            r#"[{{"title": "{}", "description": "d", "content": "c"}}]"#,
            "t".repeat(500)
        );
        let leaked: &'static str = Box::leak(response.into_boxed_str());
        let extractor = Extractor::new(SharedChatProvider::new(Fixed(leaked)));
        let items = extractor
            .extract("q", "a", &success(), None, Provenance::default())
            .await;
        assert_eq!(items[0].title.chars().count(), corvid_core::memory::TITLE_MAX);
    }
}
