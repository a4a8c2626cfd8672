//! Derived graph metadata: the read-only view the tool surface works from.

use crate::error::GraphError;
use crate::ontology::Ontology;
use oxigraph::model::Term;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const RDF_PROPERTY: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#Property";
const RDFS_CLASS: &str = "http://www.w3.org/2000/01/rdf-schema#Class";
const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";
const OWL_OBJECT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";
const OWL_DATATYPE_PROPERTY: &str = "http://www.w3.org/2002/07/owl#DatatypeProperty";
const OWL_ANNOTATION_PROPERTY: &str = "http://www.w3.org/2002/07/owl#AnnotationProperty";

/// Configuration for metadata derivation.
#[derive(Debug, Clone)]
pub struct MetaConfig {
    /// Label predicates in preference order; the first matching one
    /// supplies the preferred label.
    pub label_predicates: Vec<String>,
    /// Prefix used to resolve bare local names (e.g. `"prov"`).
    pub default_prefix: Option<String>,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            label_predicates: vec![
                "http://www.w3.org/2000/01/rdf-schema#label".into(),
                "http://www.w3.org/2004/02/skos/core#prefLabel".into(),
                "https://schema.org/name".into(),
                "http://schema.org/name".into(),
                "http://purl.org/dc/elements/1.1/title".into(),
                "http://purl.org/dc/terms/title".into(),
                "http://xmlns.com/foaf/0.1/name".into(),
            ],
            default_prefix: None,
        }
    }
}

/// Declared domain/range sets of a property.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PropertyInfo {
    /// Declared `rdfs:domain` class IRIs.
    pub domains: BTreeSet<String>,
    /// Declared `rdfs:range` IRIs (classes or datatypes).
    pub ranges: BTreeSet<String>,
}

/// How a search candidate matched the query term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The label equals the term (case-insensitive).
    Exact,
    /// The term is a case-insensitive substring of the label.
    Substring,
}

/// The derived, immutable view of a loaded ontology.
///
/// Derivation is a single pass over the store's triples. The meta is
/// read-only for the duration of a run and safe to share.
#[derive(Debug, Clone)]
pub struct GraphMeta {
    triple_count: usize,
    classes: BTreeSet<String>,
    object_properties: BTreeSet<String>,
    datatype_properties: BTreeSet<String>,
    labels: BTreeMap<String, String>,
    reverse_labels: BTreeMap<String, Vec<String>>,
    parents: BTreeMap<String, Vec<String>>,
    children: BTreeMap<String, Vec<String>>,
    properties: BTreeMap<String, PropertyInfo>,
    predicate_counts: BTreeMap<String, usize>,
    prefixes: BTreeMap<String, String>,
    default_prefix: Option<String>,
}

impl GraphMeta {
    /// Derive metadata from a loaded ontology.
    pub fn derive(ontology: &Ontology, config: &MetaConfig) -> Result<Self, GraphError> {
        let label_rank: BTreeMap<&str, usize> = config
            .label_predicates
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_str(), i))
            .collect();

        let mut triple_count = 0usize;
        let mut classes = BTreeSet::new();
        let mut object_properties = BTreeSet::new();
        let mut datatype_properties = BTreeSet::new();
        let mut preferred: BTreeMap<String, (usize, String)> = BTreeMap::new();
        let mut reverse_labels: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut parents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut properties: BTreeMap<String, PropertyInfo> = BTreeMap::new();
        let mut predicate_counts: BTreeMap<String, usize> = BTreeMap::new();

        for quad in ontology.store().iter() {
            let quad = quad.map_err(|e| GraphError::Store(e.to_string()))?;
            triple_count += 1;
            let predicate = quad.predicate.as_str().to_string();
            *predicate_counts.entry(predicate.clone()).or_insert(0) += 1;

            let subject_iri = match &quad.subject {
                oxigraph::model::Subject::NamedNode(n) => Some(n.as_str().to_string()),
                _ => None,
            };
            let object_iri = match &quad.object {
                Term::NamedNode(n) => Some(n.as_str().to_string()),
                _ => None,
            };

            match predicate.as_str() {
                RDF_TYPE => {
                    if let (Some(s), Some(o)) = (&subject_iri, &object_iri) {
                        match o.as_str() {
                            OWL_CLASS | RDFS_CLASS => {
                                classes.insert(s.clone());
                            }
                            OWL_OBJECT_PROPERTY | RDF_PROPERTY => {
                                object_properties.insert(s.clone());
                            }
                            OWL_DATATYPE_PROPERTY | OWL_ANNOTATION_PROPERTY => {
                                datatype_properties.insert(s.clone());
                            }
                            _ => {}
                        }
                    }
                }
                RDFS_SUBCLASS_OF => {
                    if let (Some(s), Some(o)) = (&subject_iri, &object_iri) {
                        classes.insert(s.clone());
                        classes.insert(o.clone());
                        parents.entry(s.clone()).or_default().push(o.clone());
                        children.entry(o.clone()).or_default().push(s.clone());
                    }
                }
                RDFS_DOMAIN => {
                    if let (Some(s), Some(o)) = (&subject_iri, &object_iri) {
                        properties
                            .entry(s.clone())
                            .or_default()
                            .domains
                            .insert(o.clone());
                    }
                }
                RDFS_RANGE => {
                    if let (Some(s), Some(o)) = (&subject_iri, &object_iri) {
                        properties
                            .entry(s.clone())
                            .or_default()
                            .ranges
                            .insert(o.clone());
                    }
                }
                _ => {}
            }

            if let Some(rank) = label_rank.get(predicate.as_str()) {
                if let (Some(s), Term::Literal(l)) = (&subject_iri, &quad.object) {
                    let value = l.value().to_string();
                    let slot = preferred.entry(s.clone()).or_insert((*rank, value.clone()));
                    if *rank < slot.0 {
                        *slot = (*rank, value.clone());
                    }
                    let bucket = reverse_labels.entry(value.to_lowercase()).or_default();
                    if !bucket.contains(s) {
                        bucket.push(s.clone());
                    }
                }
            }
        }

        let labels = preferred
            .into_iter()
            .map(|(id, (_, label))| (id, label))
            .collect();

        Ok(Self {
            triple_count,
            classes,
            object_properties,
            datatype_properties,
            labels,
            reverse_labels,
            parents,
            children,
            properties,
            predicate_counts,
            prefixes: ontology.prefixes().clone(),
            default_prefix: config.default_prefix.clone(),
        })
    }

    /// Number of triples at derivation time.
    pub fn triple_count(&self) -> usize {
        self.triple_count
    }

    /// The class identifier set.
    pub fn classes(&self) -> &BTreeSet<String> {
        &self.classes
    }

    /// The object-property identifier set.
    pub fn object_properties(&self) -> &BTreeSet<String> {
        &self.object_properties
    }

    /// The datatype/annotation-property identifier set.
    pub fn datatype_properties(&self) -> &BTreeSet<String> {
        &self.datatype_properties
    }

    /// Whether the identifier is a known class.
    pub fn is_class(&self, iri: &str) -> bool {
        self.classes.contains(iri)
    }

    /// Whether the identifier is a known property of either kind.
    pub fn is_property(&self, iri: &str) -> bool {
        self.object_properties.contains(iri)
            || self.datatype_properties.contains(iri)
            || self.properties.contains_key(iri)
    }

    /// Preferred human label of an identifier.
    pub fn label(&self, iri: &str) -> Option<&str> {
        self.labels.get(iri).map(String::as_str)
    }

    /// Direct superclasses.
    pub fn parents_of(&self, iri: &str) -> &[String] {
        self.parents.get(iri).map_or(&[], Vec::as_slice)
    }

    /// Direct subclasses.
    pub fn children_of(&self, iri: &str) -> &[String] {
        self.children.get(iri).map_or(&[], Vec::as_slice)
    }

    /// Declared domain/range info for a property.
    pub fn property_info(&self, iri: &str) -> Option<&PropertyInfo> {
        self.properties.get(iri)
    }

    /// Per-predicate usage counts.
    pub fn predicate_counts(&self) -> &BTreeMap<String, usize> {
        &self.predicate_counts
    }

    /// The namespace bindings.
    pub fn prefixes(&self) -> &BTreeMap<String, String> {
        &self.prefixes
    }

    /// Search the reverse label index: exact (case-insensitive) matches
    /// first, then substring matches, up to `limit` candidates.
    pub fn search(&self, term: &str, limit: usize) -> Vec<(String, String, MatchKind)> {
        let needle = term.to_lowercase();
        let mut out = Vec::new();
        if let Some(ids) = self.reverse_labels.get(&needle) {
            for id in ids {
                if out.len() >= limit {
                    return out;
                }
                let label = self.label(id).unwrap_or(term).to_string();
                out.push((id.clone(), label, MatchKind::Exact));
            }
        }
        for (label_lower, ids) in &self.reverse_labels {
            if out.len() >= limit {
                break;
            }
            if label_lower == &needle || !label_lower.contains(&needle) {
                continue;
            }
            for id in ids {
                if out.len() >= limit {
                    break;
                }
                let label = self.label(id).unwrap_or(label_lower).to_string();
                out.push((id.clone(), label, MatchKind::Substring));
            }
        }
        out
    }

    /// Resolve a URI-shaped string: absolute IRIs pass through, prefixed
    /// names expand against the bindings, bare local names resolve against
    /// the configured default prefix.
    pub fn resolve(&self, input: &str) -> Result<String, GraphError> {
        let input = input.trim();
        let input = input
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(input);
        if input.contains("://") || input.starts_with("urn:") || input.starts_with("mailto:") {
            return Ok(input.to_string());
        }
        if let Some((prefix, local)) = input.split_once(':') {
            return match self.prefixes.get(prefix) {
                Some(ns) => Ok(format!("{ns}{local}")),
                None => Err(GraphError::UnknownPrefix(prefix.to_string())),
            };
        }
        if let Some(default) = &self.default_prefix {
            if let Some(ns) = self.prefixes.get(default) {
                return Ok(format!("{ns}{input}"));
            }
        }
        Err(GraphError::BadIri(format!(
            "`{input}` is not an IRI and no default prefix is configured"
        )))
    }

    /// Compact an absolute IRI to `prefix:local` form when a binding
    /// covers it (longest namespace wins); the full IRI otherwise.
    pub fn compact(&self, iri: &str) -> String {
        let mut best: Option<(&str, &str)> = None;
        for (prefix, ns) in &self.prefixes {
            if iri.starts_with(ns.as_str()) && best.is_none_or(|(_, b): (_, &str)| ns.len() > b.len()) {
                best = Some((prefix, ns));
            }
        }
        match best {
            Some((prefix, ns)) => format!("{prefix}:{}", &iri[ns.len()..]),
            None => iri.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TURTLE: &str = r#"
        @prefix ex: <http://example.org/> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        @prefix skos: <http://www.w3.org/2004/02/skos/core#> .
        ex:Activity a owl:Class ;
            rdfs:label "Activity" .
        ex:Running a owl:Class ;
            rdfs:subClassOf ex:Activity ;
            skos:prefLabel "Running" .
        ex:Sprinting rdfs:subClassOf ex:Running .
        ex:performedBy a owl:ObjectProperty ;
            rdfs:label "performed by" ;
            rdfs:domain ex:Activity ;
            rdfs:range ex:Agent .
        ex:Agent a owl:Class .
    "#;

    fn meta() -> GraphMeta {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        let config = MetaConfig {
            default_prefix: Some("ex".into()),
            ..MetaConfig::default()
        };
        GraphMeta::derive(&ontology, &config).unwrap()
    }

    #[test]
    fn classes_and_properties_collected() {
        let m = meta();
        assert!(m.is_class("http://example.org/Activity"));
        assert!(m.is_class("http://example.org/Running"));
        // Declared only through subClassOf, still a class.
        assert!(m.is_class("http://example.org/Sprinting"));
        assert!(m.is_property("http://example.org/performedBy"));
        assert!(!m.is_class("http://example.org/performedBy"));
    }

    #[test]
    fn preferred_label_follows_predicate_order() {
        let m = meta();
        assert_eq!(m.label("http://example.org/Activity"), Some("Activity"));
        assert_eq!(m.label("http://example.org/Running"), Some("Running"));
        assert_eq!(m.label("http://example.org/Sprinting"), None);
    }

    #[test]
    fn hierarchy_links() {
        let m = meta();
        assert_eq!(
            m.children_of("http://example.org/Activity"),
            &["http://example.org/Running".to_string()]
        );
        assert_eq!(
            m.parents_of("http://example.org/Sprinting"),
            &["http://example.org/Running".to_string()]
        );
        assert!(m.children_of("http://example.org/Agent").is_empty());
    }

    #[test]
    fn domain_range_recorded() {
        let m = meta();
        let info = m.property_info("http://example.org/performedBy").unwrap();
        assert!(info.domains.contains("http://example.org/Activity"));
        assert!(info.ranges.contains("http://example.org/Agent"));
    }

    #[test]
    fn search_exact_before_substring() {
        let m = meta();
        let hits = m.search("activity", 10);
        assert_eq!(hits[0].2, MatchKind::Exact);
        assert_eq!(hits[0].0, "http://example.org/Activity");
        let hits = m.search("run", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].2, MatchKind::Substring);
    }

    #[test]
    fn search_respects_limit() {
        let m = meta();
        assert!(m.search("a", 1).len() <= 1);
    }

    #[test]
    fn resolve_forms() {
        let m = meta();
        assert_eq!(
            m.resolve("http://example.org/Activity").unwrap(),
            "http://example.org/Activity"
        );
        assert_eq!(
            m.resolve("<http://example.org/Activity>").unwrap(),
            "http://example.org/Activity"
        );
        assert_eq!(
            m.resolve("ex:Activity").unwrap(),
            "http://example.org/Activity"
        );
        assert_eq!(
            m.resolve("Activity").unwrap(),
            "http://example.org/Activity"
        );
        assert!(matches!(
            m.resolve("nope:Activity"),
            Err(GraphError::UnknownPrefix(_))
        ));
    }

    #[test]
    fn compact_uses_longest_binding() {
        let m = meta();
        assert_eq!(m.compact("http://example.org/Activity"), "ex:Activity");
        assert_eq!(
            m.compact("http://unbound.example/X"),
            "http://unbound.example/X"
        );
    }

    #[test]
    fn predicate_counts_cover_all_triples() {
        let m = meta();
        let total: usize = m.predicate_counts().values().sum();
        assert_eq!(total, m.triple_count());
    }

    #[test]
    fn empty_graph_derives_empty_meta() {
        let ontology = Ontology::from_turtle("").unwrap();
        let m = GraphMeta::derive(&ontology, &MetaConfig::default()).unwrap();
        assert_eq!(m.triple_count(), 0);
        assert!(m.classes().is_empty());
        assert!(m.search("anything", 5).is_empty());
    }
}
