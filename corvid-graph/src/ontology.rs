//! Loaded-ontology handle: parsing, prefixes, bounded SPARQL, edge probes.

use crate::error::GraphError;
use crate::term::TermRepr;
use oxigraph::io::RdfFormat;
use oxigraph::model::{NamedNodeRef, Term};
use oxigraph::sparql::{Query, QueryResults};
use oxigraph::store::Store;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// The kind of a SPARQL query, detected from its first form keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// A SELECT query (rows).
    Select,
    /// An ASK query (boolean).
    Ask,
    /// A CONSTRUCT query (graph).
    Construct,
    /// A DESCRIBE query (graph).
    Describe,
    /// Anything else (updates are not accepted here).
    Unknown,
}

impl QueryKind {
    /// Detect the query form, skipping the prologue and comments.
    pub fn detect(query: &str) -> Self {
        for line in query.lines() {
            let line = match line.find('#') {
                Some(i) => &line[..i],
                None => line,
            };
            for token in line.split_whitespace() {
                let upper = token.to_ascii_uppercase();
                match upper.as_str() {
                    "PREFIX" | "BASE" => break, // rest of line is prologue
                    "SELECT" => return QueryKind::Select,
                    "ASK" => return QueryKind::Ask,
                    "CONSTRUCT" => return QueryKind::Construct,
                    "DESCRIBE" => return QueryKind::Describe,
                    _ => {}
                }
            }
        }
        QueryKind::Unknown
    }
}

/// Whether a query text already carries a LIMIT clause.
pub fn has_limit(query: &str) -> bool {
    query
        .split_whitespace()
        .any(|token| token.eq_ignore_ascii_case("limit"))
}

/// One outgoing or incoming edge of an entity.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Edge {
    /// The predicate IRI.
    pub predicate: String,
    /// The value at the far end.
    pub value: TermRepr,
}

/// Result of a SELECT execution.
#[derive(Debug, Clone)]
pub struct SelectResult {
    /// Projected variable names, in order.
    pub columns: Vec<String>,
    /// Solution rows; unbound variables appear as [`TermRepr::Unbound`].
    pub rows: Vec<Vec<TermRepr>>,
    /// The LIMIT value injected by the adapter, if the query had none.
    pub injected_limit: Option<usize>,
}

/// Result of a CONSTRUCT or DESCRIBE execution.
#[derive(Debug, Clone)]
pub struct ConstructResult {
    /// Collected triples, capped at the call's limit.
    pub triples: Vec<(TermRepr, TermRepr, TermRepr)>,
    /// Total triples produced before capping.
    pub total: usize,
}

/// A loaded ontology held in an in-memory store, plus the namespace
/// bindings scraped from its source.
pub struct Ontology {
    store: Store,
    prefixes: BTreeMap<String, String>,
}

impl Ontology {
    /// Parse an ontology from Turtle text.
    pub fn from_turtle(text: &str) -> Result<Self, GraphError> {
        Self::from_reader(RdfFormat::Turtle, text)
    }

    /// Load an ontology from a file path. The format is chosen by
    /// extension (`.ttl`/`.turtle` → Turtle, `.nt` → N-Triples,
    /// `.rdf`/`.owl`/`.xml` → RDF/XML); Turtle otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let format = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("nt") => RdfFormat::NTriples,
            Some("rdf") | Some("owl") | Some("xml") => RdfFormat::RdfXml,
            _ => RdfFormat::Turtle,
        };
        let ontology = Self::from_reader(format, &text)?;
        tracing::info!(
            path = %path.display(),
            triples = ontology.triple_count(),
            "ontology loaded"
        );
        Ok(ontology)
    }

    fn from_reader(format: RdfFormat, text: &str) -> Result<Self, GraphError> {
        let store = Store::new().map_err(|e| GraphError::Store(e.to_string()))?;
        store
            .load_from_reader(format, text.as_bytes())
            .map_err(|e| GraphError::Parse(e.to_string()))?;
        let mut prefixes = well_known_prefixes();
        scrape_prefixes(text, &mut prefixes);
        Ok(Self { store, prefixes })
    }

    /// Number of triples in the store.
    pub fn triple_count(&self) -> usize {
        self.store.len().unwrap_or(0)
    }

    /// The namespace bindings (scraped declarations over well-known
    /// defaults).
    pub fn prefixes(&self) -> &BTreeMap<String, String> {
        &self.prefixes
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// Execute a SELECT query. If the text has no LIMIT clause one is
    /// injected; rows are additionally capped at `limit` regardless.
    pub fn select(&self, query: &str, limit: usize) -> Result<SelectResult, GraphError> {
        let (text, injected) = if has_limit(query) {
            (query.to_string(), None)
        } else {
            (format!("{query}\nLIMIT {limit}"), Some(limit))
        };
        let parsed =
            Query::parse(&text, None).map_err(|e| GraphError::Query(e.to_string()))?;
        let results = self
            .store
            .query(parsed)
            .map_err(|e| GraphError::Query(e.to_string()))?;
        let QueryResults::Solutions(solutions) = results else {
            return Err(GraphError::Query("query did not produce solutions".into()));
        };
        let columns: Vec<String> = solutions
            .variables()
            .iter()
            .map(|v| v.as_str().to_string())
            .collect();
        let mut rows = Vec::new();
        for solution in solutions {
            let solution = solution.map_err(|e| GraphError::Query(e.to_string()))?;
            let row: Vec<TermRepr> = columns
                .iter()
                .map(|name| match solution.get(name.as_str()) {
                    Some(term) => TermRepr::from_term(term),
                    None => TermRepr::Unbound,
                })
                .collect();
            rows.push(row);
            if rows.len() >= limit {
                break;
            }
        }
        Ok(SelectResult {
            columns,
            rows,
            injected_limit: injected,
        })
    }

    /// Execute a CONSTRUCT or DESCRIBE query, capping collected triples.
    pub fn construct(&self, query: &str, limit: usize) -> Result<ConstructResult, GraphError> {
        let parsed =
            Query::parse(query, None).map_err(|e| GraphError::Query(e.to_string()))?;
        let results = self
            .store
            .query(parsed)
            .map_err(|e| GraphError::Query(e.to_string()))?;
        let QueryResults::Graph(triples) = results else {
            return Err(GraphError::Query("query did not produce a graph".into()));
        };
        let mut collected = Vec::new();
        let mut total = 0usize;
        for triple in triples {
            let triple = triple.map_err(|e| GraphError::Query(e.to_string()))?;
            total += 1;
            if collected.len() < limit {
                collected.push((
                    TermRepr::from_subject(&triple.subject),
                    TermRepr::Iri {
                        iri: triple.predicate.as_str().to_string(),
                    },
                    TermRepr::from_term(&triple.object),
                ));
            }
        }
        Ok(ConstructResult {
            triples: collected,
            total,
        })
    }

    /// Execute an ASK query.
    pub fn ask(&self, query: &str) -> Result<bool, GraphError> {
        let parsed =
            Query::parse(query, None).map_err(|e| GraphError::Query(e.to_string()))?;
        let results = self
            .store
            .query(parsed)
            .map_err(|e| GraphError::Query(e.to_string()))?;
        match results {
            QueryResults::Boolean(b) => Ok(b),
            _ => Err(GraphError::Query("query did not produce a boolean".into())),
        }
    }

    /// Outgoing edges of an entity, capped at `limit`.
    pub fn outgoing(&self, iri: &str, limit: usize) -> Result<Vec<Edge>, GraphError> {
        let node =
            NamedNodeRef::new(iri).map_err(|e| GraphError::BadIri(e.to_string()))?;
        let mut edges = Vec::new();
        for quad in self
            .store
            .quads_for_pattern(Some(node.into()), None, None, None)
        {
            let quad = quad.map_err(|e| GraphError::Store(e.to_string()))?;
            if edges.len() >= limit {
                break;
            }
            edges.push(Edge {
                predicate: quad.predicate.as_str().to_string(),
                value: TermRepr::from_term(&quad.object),
            });
        }
        Ok(edges)
    }

    /// Total number of outgoing edges of an entity.
    pub fn outgoing_count(&self, iri: &str) -> Result<usize, GraphError> {
        let node =
            NamedNodeRef::new(iri).map_err(|e| GraphError::BadIri(e.to_string()))?;
        Ok(self
            .store
            .quads_for_pattern(Some(node.into()), None, None, None)
            .count())
    }

    /// Incoming edges of an entity (predicate + subject), capped at `limit`.
    pub fn incoming(&self, iri: &str, limit: usize) -> Result<Vec<Edge>, GraphError> {
        let node =
            NamedNodeRef::new(iri).map_err(|e| GraphError::BadIri(e.to_string()))?;
        let mut edges = Vec::new();
        for quad in self
            .store
            .quads_for_pattern(None, None, Some(node.into()), None)
        {
            let quad = quad.map_err(|e| GraphError::Store(e.to_string()))?;
            if edges.len() >= limit {
                break;
            }
            edges.push(Edge {
                predicate: quad.predicate.as_str().to_string(),
                value: TermRepr::from_subject(&quad.subject),
            });
        }
        Ok(edges)
    }

    /// Total number of incoming edges of an entity.
    pub fn incoming_count(&self, iri: &str) -> Result<usize, GraphError> {
        let node =
            NamedNodeRef::new(iri).map_err(|e| GraphError::BadIri(e.to_string()))?;
        Ok(self
            .store
            .quads_for_pattern(None, None, Some(node.into()), None)
            .count())
    }

    /// Literal values of the given predicates on an entity, in predicate
    /// order (used for labels and comments).
    pub fn literal_values(
        &self,
        iri: &str,
        predicates: &[&str],
        limit: usize,
    ) -> Result<Vec<String>, GraphError> {
        let node =
            NamedNodeRef::new(iri).map_err(|e| GraphError::BadIri(e.to_string()))?;
        let mut values = Vec::new();
        for predicate in predicates {
            let Ok(pred) = NamedNodeRef::new(predicate) else {
                continue;
            };
            for quad in
                self.store
                    .quads_for_pattern(Some(node.into()), Some(pred), None, None)
            {
                let quad = quad.map_err(|e| GraphError::Store(e.to_string()))?;
                if let Term::Literal(l) = &quad.object {
                    values.push(l.value().to_string());
                    if values.len() >= limit {
                        return Ok(values);
                    }
                }
            }
        }
        Ok(values)
    }
}

/// The default bindings every ontology starts from.
fn well_known_prefixes() -> BTreeMap<String, String> {
    [
        ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
        ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
        ("owl", "http://www.w3.org/2002/07/owl#"),
        ("xsd", "http://www.w3.org/2001/XMLSchema#"),
        ("skos", "http://www.w3.org/2004/02/skos/core#"),
        ("schema", "https://schema.org/"),
        ("dc", "http://purl.org/dc/elements/1.1/"),
        ("dcterms", "http://purl.org/dc/terms/"),
        ("prov", "http://www.w3.org/ns/prov#"),
        ("foaf", "http://xmlns.com/foaf/0.1/"),
    ]
    .into_iter()
    .map(|(p, iri)| (p.to_string(), iri.to_string()))
    .collect()
}

/// Scrape `@prefix` / `PREFIX` declarations from ontology source text.
/// Declared bindings override the well-known defaults.
fn scrape_prefixes(text: &str, prefixes: &mut BTreeMap<String, String>) {
    for line in text.lines() {
        let trimmed = line.trim_start();
        let rest = if let Some(rest) = trimmed.strip_prefix("@prefix") {
            rest
        } else if trimmed.len() >= 6 && trimmed[..6].eq_ignore_ascii_case("prefix") {
            &trimmed[6..]
        } else {
            continue;
        };
        let Some(colon) = rest.find(':') else { continue };
        let prefix = rest[..colon].trim().to_string();
        let Some(open) = rest.find('<') else { continue };
        let Some(close) = rest[open..].find('>') else {
            continue;
        };
        let iri = rest[open + 1..open + close].to_string();
        prefixes.insert(prefix, iri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TURTLE: &str = r#"
        @prefix ex: <http://example.org/> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        ex:Activity a <http://www.w3.org/2002/07/owl#Class> ;
            rdfs:label "Activity" ;
            rdfs:comment "Something that occurs over a period of time." .
        ex:Running rdfs:subClassOf ex:Activity ;
            rdfs:label "Running" .
    "#;

    #[test]
    fn load_and_count() {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        assert_eq!(ontology.triple_count(), 5);
    }

    #[test]
    fn scraped_prefix_overrides_default() {
        let ontology = Ontology::from_turtle(
            "@prefix schema: <http://schema.org/> .\n\
             <http://example.org/x> schema:name \"x\" .",
        )
        .unwrap();
        assert_eq!(
            ontology.prefixes().get("schema").unwrap(),
            "http://schema.org/"
        );
        // Defaults remain present.
        assert!(ontology.prefixes().contains_key("rdfs"));
    }

    #[test]
    fn query_kind_detection() {
        assert_eq!(
            QueryKind::detect("PREFIX ex: <http://e/>\nSELECT ?x WHERE { ?x ?p ?o }"),
            QueryKind::Select
        );
        assert_eq!(QueryKind::detect("ASK { ?s ?p ?o }"), QueryKind::Ask);
        assert_eq!(
            QueryKind::detect("# comment with SELECT\nCONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }"),
            QueryKind::Construct
        );
        assert_eq!(QueryKind::detect("INSERT DATA { }"), QueryKind::Unknown);
    }

    #[test]
    fn select_injects_limit() {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        let result = ontology
            .select("SELECT ?s ?p ?o WHERE { ?s ?p ?o }", 3)
            .unwrap();
        assert_eq!(result.injected_limit, Some(3));
        assert!(result.rows.len() <= 3);
        assert_eq!(result.columns, vec!["s", "p", "o"]);
    }

    #[test]
    fn select_respects_explicit_limit() {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        let result = ontology
            .select("SELECT ?s WHERE { ?s ?p ?o } LIMIT 2", 100)
            .unwrap();
        assert_eq!(result.injected_limit, None);
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn select_caps_rows_even_with_large_explicit_limit() {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        let result = ontology
            .select("SELECT ?s WHERE { ?s ?p ?o } LIMIT 9999", 2)
            .unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn ask_and_construct() {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        assert!(ontology
            .ask("PREFIX ex: <http://example.org/> ASK { ex:Running ?p ?o }")
            .unwrap());
        let graph = ontology
            .construct(
                "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
                 CONSTRUCT { ?s rdfs:label ?l } WHERE { ?s rdfs:label ?l }",
                10,
            )
            .unwrap();
        assert_eq!(graph.total, 2);
    }

    #[test]
    fn edges_and_counts() {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        let out = ontology.outgoing("http://example.org/Activity", 10).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(
            ontology.incoming_count("http://example.org/Activity").unwrap(),
            1
        );
        let capped = ontology.outgoing("http://example.org/Activity", 1).unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn literal_values_in_predicate_order() {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        let labels = ontology
            .literal_values(
                "http://example.org/Activity",
                &[
                    "http://www.w3.org/2000/01/rdf-schema#label",
                    "http://www.w3.org/2004/02/skos/core#prefLabel",
                ],
                5,
            )
            .unwrap();
        assert_eq!(labels, vec!["Activity"]);
    }

    #[test]
    fn empty_ontology_is_fine() {
        let ontology = Ontology::from_turtle("").unwrap();
        assert_eq!(ontology.triple_count(), 0);
        let result = ontology
            .select("SELECT ?s WHERE { ?s ?p ?o }", 10)
            .unwrap();
        assert!(result.rows.is_empty());
    }

    #[test]
    fn bad_query_is_an_error() {
        let ontology = Ontology::from_turtle("").unwrap();
        assert!(matches!(
            ontology.select("SELECT WHERE {", 10),
            Err(GraphError::Query(_))
        ));
    }
}
