//! SPARQL execution tools with handle-returning semantics.
//!
//! Neither tool ever returns rows directly: results are registered in the
//! [`HandleRegistry`] and a bounded summary comes back. When a
//! [`FeedbackInjector`] is installed, its block is appended to the
//! summary under `verification` and echoed by the REPL.

use crate::args::ToolArgs;
use crate::error::{ToolError, ToolErrorKind};
use crate::explore::graph_to_tool;
use crate::handles::{HandleProvenance, HandleRegistry, ResultHandle, ResultSet};
use crate::registry::ToolDyn;
use corvid_graph::{has_limit, Ontology, QueryKind, TermRepr};
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// The verification seam: reviews a query + its stored handle and
/// produces the feedback block, if any checks fired.
pub trait FeedbackInjector: Send + Sync {
    /// Review one execution. `None` means verification is disabled or
    /// produced nothing.
    fn review(&self, query: &str, handle: &ResultHandle) -> Option<String>;
}

fn summarize(
    handle: &Arc<ResultHandle>,
    injector: Option<&Arc<dyn FeedbackInjector>>,
) -> Value {
    let mut summary = handle.summary();
    if let Some(injector) = injector {
        if let Some(block) = injector.review(&handle.query, handle) {
            summary["verification"] = json!(block);
        }
    }
    summary
}

/// `sparql_local(query, name, limit=100)` — run against the loaded
/// ontology.
pub struct SparqlLocalTool {
    ontology: Arc<Ontology>,
    handles: Arc<HandleRegistry>,
    injector: Option<Arc<dyn FeedbackInjector>>,
}

impl SparqlLocalTool {
    /// Build over the per-run state.
    pub fn new(
        ontology: Arc<Ontology>,
        handles: Arc<HandleRegistry>,
        injector: Option<Arc<dyn FeedbackInjector>>,
    ) -> Self {
        Self {
            ontology,
            handles,
            injector,
        }
    }
}

impl ToolDyn for SparqlLocalTool {
    fn name(&self) -> &str {
        "sparql_local"
    }
    fn summary(&self) -> &str {
        "Run SPARQL on the loaded ontology; store the result under a name."
    }
    fn signature(&self) -> &str {
        "sparql_local(query, name, limit=100)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let query = args.require_str(0, "query")?.to_string();
            let name = args.require_str(1, "name")?.to_string();
            let limit = args.opt_usize(2, "limit", 100)?;

            let result = match QueryKind::detect(&query) {
                QueryKind::Select => {
                    let select = self
                        .ontology
                        .select(&query, limit)
                        .map_err(graph_to_tool)?;
                    ResultSet::Rows {
                        columns: select.columns,
                        rows: select.rows,
                    }
                }
                QueryKind::Ask => {
                    ResultSet::Boolean(self.ontology.ask(&query).map_err(graph_to_tool)?)
                }
                QueryKind::Construct | QueryKind::Describe => {
                    let graph = self
                        .ontology
                        .construct(&query, limit)
                        .map_err(graph_to_tool)?;
                    ResultSet::Graph {
                        triples: graph.triples,
                        total: graph.total,
                    }
                }
                QueryKind::Unknown => {
                    return Err(ToolError::bad_input(
                        "only SELECT, ASK, CONSTRUCT and DESCRIBE are accepted",
                        "updates are not available through this tool",
                    ));
                }
            };

            tracing::debug!(name = %name, rows = result.row_count(), "sparql_local executed");
            let handle = self.handles.insert(ResultHandle {
                name,
                query,
                result,
                provenance: HandleProvenance::LocalOntology,
            });
            Ok(summarize(&handle, self.injector.as_ref()))
        })
    }
}

/// `sparql_remote(query, name, endpoint, limit=100, timeout_s=30)` —
/// run against an HTTP SPARQL endpoint.
pub struct SparqlRemoteTool {
    client: reqwest::Client,
    handles: Arc<HandleRegistry>,
    injector: Option<Arc<dyn FeedbackInjector>>,
}

impl SparqlRemoteTool {
    /// Build over the per-run handle registry.
    pub fn new(
        handles: Arc<HandleRegistry>,
        injector: Option<Arc<dyn FeedbackInjector>>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            handles,
            injector,
        }
    }
}

impl ToolDyn for SparqlRemoteTool {
    fn name(&self) -> &str {
        "sparql_remote"
    }
    fn summary(&self) -> &str {
        "Run SPARQL on a remote endpoint; store the result under a name."
    }
    fn signature(&self) -> &str {
        "sparql_remote(query, name, endpoint, limit=100, timeout_s=30)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let query = args.require_str(0, "query")?.to_string();
            let name = args.require_str(1, "name")?.to_string();
            let endpoint = args.require_str(2, "endpoint")?.to_string();
            let limit = args.opt_usize(3, "limit", 100)?;
            let timeout_s = args.opt_usize(4, "timeout_s", 30)?;

            let sent_query = if QueryKind::detect(&query) == QueryKind::Select
                && !has_limit(&query)
            {
                format!("{query}\nLIMIT {limit}")
            } else {
                query.clone()
            };

            let response = self
                .client
                .post(&endpoint)
                .header("content-type", "application/sparql-query")
                .header("accept", "application/sparql-results+json")
                .timeout(Duration::from_secs(timeout_s as u64))
                .body(sent_query)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ToolError::new(
                            ToolErrorKind::EndpointTimeout,
                            format!("`{endpoint}` timed out after {timeout_s}s"),
                            "raise timeout_s or simplify the query",
                        )
                    } else {
                        ToolError::new(
                            ToolErrorKind::EndpointUnreachable,
                            format!("could not reach `{endpoint}`: {e}"),
                            "check the endpoint URL",
                        )
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ToolError::new(
                    ToolErrorKind::EndpointError,
                    format!("`{endpoint}` returned HTTP {status}"),
                    crate::bound::bound(&body, 200),
                ));
            }

            let body: Value = response.json().await.map_err(|e| {
                ToolError::new(
                    ToolErrorKind::EndpointError,
                    format!("`{endpoint}` returned non-JSON results: {e}"),
                    "the endpoint must speak application/sparql-results+json",
                )
            })?;

            let result = parse_sparql_json(&body, limit)?;
            tracing::debug!(name = %name, endpoint = %endpoint, rows = result.row_count(), "sparql_remote executed");
            let handle = self.handles.insert(ResultHandle {
                name,
                query,
                result,
                provenance: HandleProvenance::RemoteEndpoint(endpoint),
            });
            Ok(summarize(&handle, self.injector.as_ref()))
        })
    }
}

/// Parse the SPARQL 1.1 JSON results format into a [`ResultSet`].
fn parse_sparql_json(body: &Value, limit: usize) -> Result<ResultSet, ToolError> {
    if let Some(boolean) = body.get("boolean").and_then(Value::as_bool) {
        return Ok(ResultSet::Boolean(boolean));
    }
    let vars: Vec<String> = body["head"]["vars"]
        .as_array()
        .map(|vars| {
            vars.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let bindings = body["results"]["bindings"].as_array().ok_or_else(|| {
        ToolError::new(
            ToolErrorKind::EndpointError,
            "results JSON has neither `boolean` nor `results.bindings`",
            "the endpoint must speak application/sparql-results+json",
        )
    })?;
    let rows: Vec<Vec<TermRepr>> = bindings
        .iter()
        .take(limit)
        .map(|binding| {
            vars.iter()
                .map(|var| match binding.get(var) {
                    Some(term) => json_term(term),
                    None => TermRepr::Unbound,
                })
                .collect()
        })
        .collect();
    Ok(ResultSet::Rows {
        columns: vars,
        rows,
    })
}

fn json_term(term: &Value) -> TermRepr {
    let value = term["value"].as_str().unwrap_or_default().to_string();
    match term["type"].as_str() {
        Some("uri") => TermRepr::Iri { iri: value },
        Some("bnode") => TermRepr::Blank { label: value },
        _ => TermRepr::Literal {
            value,
            datatype: term["datatype"].as_str().map(String::from),
            lang: term["xml:lang"].as_str().map(String::from),
        },
    }
}
