//! Ontology exploration tools over the derived graph metadata.

use crate::args::ToolArgs;
use crate::error::ToolError;
use crate::registry::ToolDyn;
use corvid_graph::{GraphMeta, Ontology, TermRepr};
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

const LABEL_PREDICATES: &[&str] = &[
    "http://www.w3.org/2000/01/rdf-schema#label",
    "http://www.w3.org/2004/02/skos/core#prefLabel",
    "https://schema.org/name",
    "http://schema.org/name",
];

const COMMENT_PREDICATES: &[&str] = &[
    "http://www.w3.org/2000/01/rdf-schema#comment",
    "http://www.w3.org/2004/02/skos/core#definition",
    "http://purl.org/dc/terms/description",
    "http://purl.org/dc/elements/1.1/description",
];

/// `search_entity(term, limit=10)` — match entities by label.
pub struct SearchEntityTool {
    meta: Arc<GraphMeta>,
}

impl SearchEntityTool {
    /// Build over derived metadata.
    pub fn new(meta: Arc<GraphMeta>) -> Self {
        Self { meta }
    }
}

impl ToolDyn for SearchEntityTool {
    fn name(&self) -> &str {
        "search_entity"
    }
    fn summary(&self) -> &str {
        "Search entities by label: exact matches first, then substrings."
    }
    fn signature(&self) -> &str {
        "search_entity(term, limit=10)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let term = args.require_str(0, "term")?.to_string();
            let limit = args.opt_usize(1, "limit", 10)?;
            let hits = self.meta.search(&term, limit);
            if hits.is_empty() {
                return Err(ToolError::not_found(
                    format!("no entity labelled like `{term}`"),
                    "try a shorter substring, or predicate_frequency() to survey the graph",
                ));
            }
            let out: Vec<Value> = hits
                .into_iter()
                .map(|(id, label, kind)| {
                    json!({
                        "identifier": self.meta.compact(&id),
                        "label": label,
                        "match_kind": kind,
                    })
                })
                .collect();
            Ok(json!(out))
        })
    }
}

/// `describe_entity(identifier, limit=20)` — labels, comments, types,
/// capped edge sample.
pub struct DescribeEntityTool {
    ontology: Arc<Ontology>,
    meta: Arc<GraphMeta>,
}

impl DescribeEntityTool {
    /// Build over the loaded ontology and its metadata.
    pub fn new(ontology: Arc<Ontology>, meta: Arc<GraphMeta>) -> Self {
        Self { ontology, meta }
    }
}

impl ToolDyn for DescribeEntityTool {
    fn name(&self) -> &str {
        "describe_entity"
    }
    fn summary(&self) -> &str {
        "Describe one entity: labels, comments, types, and an edge sample."
    }
    fn signature(&self) -> &str {
        "describe_entity(identifier, limit=20)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let identifier = args.require_str(0, "identifier")?;
            let limit = args.opt_usize(1, "limit", 20)?;
            let iri = resolve(&self.meta, identifier)?;

            let out_edges = self
                .ontology
                .outgoing(&iri, limit)
                .map_err(graph_to_tool)?;
            let out_count = self.ontology.outgoing_count(&iri).map_err(graph_to_tool)?;
            if out_count == 0 && self.ontology.incoming_count(&iri).map_err(graph_to_tool)? == 0 {
                return Err(ToolError::not_found(
                    format!("`{identifier}` has no triples in the graph"),
                    "search_entity() first to find the exact identifier",
                ));
            }

            let labels = self
                .ontology
                .literal_values(&iri, LABEL_PREDICATES, 5)
                .map_err(graph_to_tool)?;
            let comments = self
                .ontology
                .literal_values(&iri, COMMENT_PREDICATES, 5)
                .map_err(graph_to_tool)?;

            let mut types = Vec::new();
            let mut edges = Vec::new();
            for edge in &out_edges {
                if edge.predicate == "http://www.w3.org/1999/02/22-rdf-syntax-ns#type" {
                    if let TermRepr::Iri { iri } = &edge.value {
                        types.push(self.meta.compact(iri));
                    }
                    continue;
                }
                edges.push(json!({
                    "predicate": self.meta.compact(&edge.predicate),
                    "value_sample": render_value(&self.meta, &edge.value),
                }));
            }
            let overflow = out_count.saturating_sub(out_edges.len());

            Ok(json!({
                "identifier": self.meta.compact(&iri),
                "labels": labels,
                "comments": comments,
                "types": types,
                "out_edges": edges,
                "out_edges_overflow": overflow,
                "in_edges_count": self.ontology.incoming_count(&iri).map_err(graph_to_tool)?,
            }))
        })
    }
}

/// `probe_relationships(identifier, limit=15)` — adjacent predicates and
/// neighbours in both directions.
pub struct ProbeRelationshipsTool {
    ontology: Arc<Ontology>,
    meta: Arc<GraphMeta>,
}

impl ProbeRelationshipsTool {
    /// Build over the loaded ontology and its metadata.
    pub fn new(ontology: Arc<Ontology>, meta: Arc<GraphMeta>) -> Self {
        Self { ontology, meta }
    }
}

impl ToolDyn for ProbeRelationshipsTool {
    fn name(&self) -> &str {
        "probe_relationships"
    }
    fn summary(&self) -> &str {
        "List an entity's relationships in both directions, with labels."
    }
    fn signature(&self) -> &str {
        "probe_relationships(identifier, limit=15)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let identifier = args.require_str(0, "identifier")?;
            let limit = args.opt_usize(1, "limit", 15)?;
            let iri = resolve(&self.meta, identifier)?;

            let mut out = Vec::new();
            for edge in self
                .ontology
                .outgoing(&iri, limit)
                .map_err(graph_to_tool)?
            {
                out.push(relationship(&self.meta, "out", &edge.predicate, &edge.value));
            }
            let remaining = limit.saturating_sub(out.len());
            if remaining > 0 {
                for edge in self
                    .ontology
                    .incoming(&iri, remaining)
                    .map_err(graph_to_tool)?
                {
                    out.push(relationship(&self.meta, "in", &edge.predicate, &edge.value));
                }
            }
            if out.is_empty() {
                return Err(ToolError::not_found(
                    format!("`{identifier}` has no relationships"),
                    "check the identifier with search_entity()",
                ));
            }
            Ok(json!(out))
        })
    }
}

/// `class_hierarchy(identifier, depth=2)` — nested subclass tree.
pub struct ClassHierarchyTool {
    meta: Arc<GraphMeta>,
}

impl ClassHierarchyTool {
    /// Build over derived metadata.
    pub fn new(meta: Arc<GraphMeta>) -> Self {
        Self { meta }
    }

    fn subtree(&self, iri: &str, depth: usize, seen: &mut Vec<String>) -> Value {
        let mut node = serde_json::Map::new();
        node.insert("identifier".into(), json!(self.meta.compact(iri)));
        if let Some(label) = self.meta.label(iri) {
            node.insert("label".into(), json!(label));
        }
        if depth > 0 {
            let mut children = Vec::new();
            for child in self.meta.children_of(iri) {
                // Cycles are broken by the identity set.
                if seen.iter().any(|s| s == child) {
                    continue;
                }
                seen.push(child.clone());
                children.push(self.subtree(child, depth - 1, seen));
            }
            if !children.is_empty() {
                node.insert("subclasses".into(), json!(children));
            }
        } else if !self.meta.children_of(iri).is_empty() {
            node.insert(
                "subclasses_truncated_at_depth".into(),
                json!(self.meta.children_of(iri).len()),
            );
        }
        Value::Object(node)
    }
}

impl ToolDyn for ClassHierarchyTool {
    fn name(&self) -> &str {
        "class_hierarchy"
    }
    fn summary(&self) -> &str {
        "Subclass tree under a class, to the given depth."
    }
    fn signature(&self) -> &str {
        "class_hierarchy(identifier, depth=2)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let identifier = args.require_str(0, "identifier")?;
            let depth = args.opt_usize(1, "depth", 2)?;
            let iri = resolve(&self.meta, identifier)?;
            if !self.meta.is_class(&iri) {
                return Err(ToolError::not_found(
                    format!("`{identifier}` is not a known class"),
                    "search_entity() to find class identifiers",
                ));
            }
            let mut seen = vec![iri.clone()];
            Ok(self.subtree(&iri, depth, &mut seen))
        })
    }
}

/// `predicate_frequency(top=20)` — most-used predicates with
/// domain/range hints.
pub struct PredicateFrequencyTool {
    meta: Arc<GraphMeta>,
}

impl PredicateFrequencyTool {
    /// Build over derived metadata.
    pub fn new(meta: Arc<GraphMeta>) -> Self {
        Self { meta }
    }
}

impl ToolDyn for PredicateFrequencyTool {
    fn name(&self) -> &str {
        "predicate_frequency"
    }
    fn summary(&self) -> &str {
        "Most-used predicates with usage counts and domain/range hints."
    }
    fn signature(&self) -> &str {
        "predicate_frequency(top=20)"
    }
    fn call(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let top = args.opt_usize(0, "top", 20)?;
            let mut counts: Vec<(&String, &usize)> =
                self.meta.predicate_counts().iter().collect();
            counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            let out: Vec<Value> = counts
                .into_iter()
                .take(top)
                .map(|(predicate, count)| {
                    let info = self.meta.property_info(predicate);
                    json!({
                        "predicate": self.meta.compact(predicate),
                        "count": count,
                        "domain_hint": info
                            .map(|i| i.domains.iter().map(|d| self.meta.compact(d)).collect::<Vec<_>>())
                            .unwrap_or_default(),
                        "range_hint": info
                            .map(|i| i.ranges.iter().map(|r| self.meta.compact(r)).collect::<Vec<_>>())
                            .unwrap_or_default(),
                    })
                })
                .collect();
            Ok(json!(out))
        })
    }
}

fn relationship(meta: &GraphMeta, direction: &str, predicate: &str, value: &TermRepr) -> Value {
    let neighbour = match value {
        TermRepr::Iri { iri } => meta.compact(iri),
        other => other.to_string(),
    };
    let neighbour_label = value
        .as_iri()
        .and_then(|iri| meta.label(iri))
        .map(String::from);
    json!({
        "direction": direction,
        "predicate": meta.compact(predicate),
        "neighbour": neighbour,
        "neighbour_label": neighbour_label,
    })
}

fn render_value(meta: &GraphMeta, value: &TermRepr) -> String {
    match value {
        TermRepr::Iri { iri } => meta.compact(iri),
        other => other.to_string(),
    }
}

pub(crate) fn resolve(meta: &GraphMeta, input: &str) -> Result<String, ToolError> {
    meta.resolve(input).map_err(|e| {
        ToolError::bad_input(
            e.to_string(),
            "use an absolute IRI, a known prefix:local form, or a bare local name",
        )
    })
}

pub(crate) fn graph_to_tool(e: corvid_graph::GraphError) -> ToolError {
    ToolError::bad_input(e.to_string(), "check the identifier or query syntax")
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_graph::MetaConfig;
    use serde_json::json;

    const TURTLE: &str = r#"
        @prefix ex: <http://example.org/> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        ex:Activity a owl:Class ;
            rdfs:label "Activity" ;
            rdfs:comment "Something that occurs over a period of time." .
        ex:Running a owl:Class ;
            rdfs:subClassOf ex:Activity ;
            rdfs:label "Running" .
        ex:Sprinting a owl:Class ;
            rdfs:subClassOf ex:Running ;
            rdfs:label "Sprinting" .
        ex:performedBy a owl:ObjectProperty ;
            rdfs:domain ex:Activity ;
            rdfs:range ex:Agent .
        ex:run1 a ex:Running ;
            ex:performedBy ex:alice .
    "#;

    fn fixtures() -> (Arc<Ontology>, Arc<GraphMeta>) {
        let ontology = Arc::new(Ontology::from_turtle(TURTLE).unwrap());
        let config = MetaConfig {
            default_prefix: Some("ex".into()),
            ..MetaConfig::default()
        };
        let meta = Arc::new(GraphMeta::derive(&ontology, &config).unwrap());
        (ontology, meta)
    }

    fn args(positional: Vec<Value>) -> ToolArgs {
        ToolArgs::new(positional, Default::default())
    }

    #[tokio::test]
    async fn search_finds_exact_then_substring() {
        let (_, meta) = fixtures();
        let tool = SearchEntityTool::new(meta);
        let out = tool.call(args(vec![json!("Running")])).await.unwrap();
        let hits = out.as_array().unwrap();
        assert_eq!(hits[0]["identifier"], "ex:Running");
        assert_eq!(hits[0]["match_kind"], "exact");
    }

    #[tokio::test]
    async fn search_miss_is_not_found() {
        let (_, meta) = fixtures();
        let tool = SearchEntityTool::new(meta);
        let e = tool.call(args(vec![json!("zzzz")])).await.unwrap_err();
        assert_eq!(e.kind, crate::ToolErrorKind::NotFound);
    }

    #[tokio::test]
    async fn describe_returns_comment_and_types() {
        let (ontology, meta) = fixtures();
        let tool = DescribeEntityTool::new(ontology, meta);
        let out = tool.call(args(vec![json!("ex:Activity")])).await.unwrap();
        assert_eq!(out["identifier"], "ex:Activity");
        assert!(out["comments"][0]
            .as_str()
            .unwrap()
            .contains("Something that occurs"));
        assert_eq!(out["types"][0], "owl:Class");
        assert_eq!(out["in_edges_count"], 1);
    }

    #[tokio::test]
    async fn describe_unknown_entity_not_found() {
        let (ontology, meta) = fixtures();
        let tool = DescribeEntityTool::new(ontology, meta);
        let e = tool
            .call(args(vec![json!("ex:Nothing")]))
            .await
            .unwrap_err();
        assert_eq!(e.kind, crate::ToolErrorKind::NotFound);
    }

    #[tokio::test]
    async fn probe_includes_both_directions() {
        let (ontology, meta) = fixtures();
        let tool = ProbeRelationshipsTool::new(ontology, meta);
        let out = tool.call(args(vec![json!("ex:Running")])).await.unwrap();
        let rels = out.as_array().unwrap();
        assert!(rels.iter().any(|r| r["direction"] == "out"));
        assert!(rels.iter().any(|r| r["direction"] == "in"));
        // The subclass edge carries its neighbour label.
        assert!(rels
            .iter()
            .any(|r| r["neighbour"] == "ex:Activity" && r["neighbour_label"] == "Activity"));
    }

    #[tokio::test]
    async fn hierarchy_nests_to_depth() {
        let (_, meta) = fixtures();
        let tool = ClassHierarchyTool::new(meta);
        let out = tool
            .call(ToolArgs::new(
                vec![json!("ex:Activity")],
                [("depth".to_string(), json!(2))].into_iter().collect(),
            ))
            .await
            .unwrap();
        assert_eq!(out["identifier"], "ex:Activity");
        assert_eq!(out["subclasses"][0]["identifier"], "ex:Running");
        assert_eq!(
            out["subclasses"][0]["subclasses"][0]["identifier"],
            "ex:Sprinting"
        );
    }

    #[tokio::test]
    async fn hierarchy_non_class_not_found() {
        let (_, meta) = fixtures();
        let tool = ClassHierarchyTool::new(meta);
        let e = tool
            .call(args(vec![json!("ex:performedBy")]))
            .await
            .unwrap_err();
        assert_eq!(e.kind, crate::ToolErrorKind::NotFound);
    }

    #[tokio::test]
    async fn predicate_frequency_sorted_with_hints() {
        let (_, meta) = fixtures();
        let tool = PredicateFrequencyTool::new(meta);
        let out = tool.call(args(vec![])).await.unwrap();
        let rows = out.as_array().unwrap();
        // rdf:type is the most frequent predicate in the fixture.
        assert_eq!(rows[0]["predicate"], "rdf:type");
        let performed_by = rows
            .iter()
            .find(|r| r["predicate"] == "ex:performedBy")
            .unwrap();
        assert_eq!(performed_by["domain_hint"][0], "ex:Activity");
        assert_eq!(performed_by["range_hint"][0], "ex:Agent");
    }
}
