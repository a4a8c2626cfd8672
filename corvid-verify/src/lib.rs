#![deny(missing_docs)]
//! Structural verification feedback for SPARQL executions.
//!
//! Runs after every local or remote SPARQL execution and appends a
//! bounded block of `✓`/`⚠`/`✗` lines to the tool output:
//!
//! 1. prefix resolution against the ontology's bindings and the query's
//!    own `PREFIX` declarations;
//! 2. domain/range compatibility for typed variables;
//! 3. `LIMIT` presence on SELECT;
//! 4. a small anti-pattern rule library;
//! 5. an emptiness hypothesis when the handle holds zero rows.
//!
//! The query text is scanned tolerantly (strings and IRIs stripped, then
//! token patterns) — the graph library remains the only real SPARQL
//! implementation in the system.

mod rules;
mod scan;

use corvid_graph::GraphMeta;
use corvid_tools::{FeedbackInjector, ResultHandle, ResultSet};
use scan::QueryScan;
use std::sync::Arc;

/// Cap on one rendered feedback block, in chars.
pub const FEEDBACK_MAX: usize = 1_000;

/// The verification feedback injector.
pub struct Verifier {
    meta: Arc<GraphMeta>,
}

impl Verifier {
    /// Build over derived graph metadata.
    pub fn new(meta: Arc<GraphMeta>) -> Self {
        Self { meta }
    }

    fn check_prefixes(&self, scan: &QueryScan, lines: &mut Vec<String>) {
        let unresolved: std::collections::BTreeSet<&str> = scan
            .used_prefixes
            .iter()
            .map(String::as_str)
            .filter(|p| {
                !scan.declared_prefixes.contains(*p) && !self.meta.prefixes().contains_key(*p)
            })
            .collect();
        if unresolved.is_empty() {
            lines.push("✓ all prefixes resolve".into());
        } else {
            for prefix in unresolved {
                lines.push(format!(
                    "✗ prefix `{prefix}:` resolves against neither the ontology nor a PREFIX declaration"
                ));
            }
        }
    }

    fn check_domain_range(&self, scan: &QueryScan, lines: &mut Vec<String>) {
        for pattern in &scan.patterns {
            let Some(predicate) = self.expand(scan, &pattern.predicate) else {
                continue;
            };
            let Some(info) = self.meta.property_info(&predicate) else {
                continue;
            };
            if !info.domains.is_empty() {
                if let Some(subject_type) = self.type_of(scan, &pattern.subject) {
                    if !self.compatible(&subject_type, &info.domains) {
                        lines.push(format!(
                            "⚠ `{}` declares domain {} but the subject is typed `{}`",
                            self.meta.compact(&predicate),
                            self.compact_set(&info.domains),
                            self.meta.compact(&subject_type),
                        ));
                    }
                }
            }
            if !info.ranges.is_empty() {
                if let Some(object_type) = self.type_of(scan, &pattern.object) {
                    if !self.compatible(&object_type, &info.ranges) {
                        lines.push(format!(
                            "⚠ `{}` declares range {} but the object is typed `{}`",
                            self.meta.compact(&predicate),
                            self.compact_set(&info.ranges),
                            self.meta.compact(&object_type),
                        ));
                    }
                }
            }
        }
    }

    /// A type is compatible with a declared set when it equals or
    /// specialises (transitively) one of its members.
    fn compatible(&self, typed: &str, declared: &std::collections::BTreeSet<String>) -> bool {
        if declared.contains(typed) {
            return true;
        }
        let mut frontier = vec![typed.to_string()];
        let mut seen = vec![typed.to_string()];
        while let Some(current) = frontier.pop() {
            for parent in self.meta.parents_of(&current) {
                if declared.contains(parent) {
                    return true;
                }
                if !seen.contains(parent) {
                    seen.push(parent.clone());
                    frontier.push(parent.clone());
                }
            }
        }
        false
    }

    fn type_of(&self, scan: &QueryScan, term: &str) -> Option<String> {
        if term.starts_with('?') {
            scan.typed_vars
                .get(term)
                .and_then(|t| self.expand(scan, t))
        } else {
            None
        }
    }

    fn expand(&self, scan: &QueryScan, token: &str) -> Option<String> {
        if token.starts_with('?') || token.starts_with('"') {
            return None;
        }
        if let Some(iri) = token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            return Some(iri.to_string());
        }
        if token == "a" {
            return Some("http://www.w3.org/1999/02/22-rdf-syntax-ns#type".into());
        }
        let (prefix, local) = token.split_once(':')?;
        scan.declared_bindings
            .get(prefix)
            .cloned()
            .or_else(|| self.meta.prefixes().get(prefix).cloned())
            .map(|ns| format!("{ns}{local}"))
    }

    fn compact_set(&self, set: &std::collections::BTreeSet<String>) -> String {
        set.iter()
            .map(|iri| self.meta.compact(iri))
            .collect::<Vec<_>>()
            .join("|")
    }

    fn check_limit(&self, query: &str, lines: &mut Vec<String>) {
        if corvid_graph::QueryKind::detect(query) != corvid_graph::QueryKind::Select {
            return;
        }
        if corvid_graph::has_limit(query) {
            lines.push("✓ LIMIT present".into());
        } else {
            lines.push("⚠ SELECT without LIMIT (the local tool injects one; add your own for portability)".into());
        }
    }

    fn check_emptiness(&self, scan: &QueryScan, handle: &ResultHandle, lines: &mut Vec<String>) {
        let empty = match &handle.result {
            ResultSet::Rows { rows, .. } => rows.is_empty(),
            ResultSet::Graph { total, .. } => *total == 0,
            ResultSet::Boolean(_) => false,
        };
        if !empty {
            return;
        }
        // One hypothesis line, most specific first.
        let unknown_class = scan.patterns.iter().find_map(|p| {
            let is_type_pattern = p.predicate == "a"
                || self
                    .expand(scan, &p.predicate)
                    .is_some_and(|iri| iri.ends_with("22-rdf-syntax-ns#type"));
            if !is_type_pattern {
                return None;
            }
            let iri = self.expand(scan, &p.object)?;
            (!self.meta.is_class(&iri)).then_some(iri)
        });
        if let Some(unknown) = unknown_class {
            lines.push(format!(
                "✗ empty: class `{}` does not appear in this graph",
                self.meta.compact(&unknown)
            ));
        } else if scan.has_filter {
            lines.push(
                "✗ empty result: an overly restrictive FILTER is the most likely cause".into(),
            );
        } else {
            lines.push(
                "✗ empty result: a required pattern may need OPTIONAL, or the class/property is wrong"
                    .into(),
            );
        }
    }
}

impl FeedbackInjector for Verifier {
    fn review(&self, query: &str, handle: &ResultHandle) -> Option<String> {
        let scan = QueryScan::of(query);
        let mut lines = Vec::new();
        self.check_prefixes(&scan, &mut lines);
        self.check_domain_range(&scan, &mut lines);
        self.check_limit(query, &mut lines);
        rules::check_anti_patterns(&scan, &mut lines);
        self.check_emptiness(&scan, handle, &mut lines);

        let mut block = String::new();
        for line in lines {
            if block.chars().count() + line.chars().count() + 1 > FEEDBACK_MAX {
                block.push_str("⚠ further feedback truncated");
                break;
            }
            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(&line);
        }
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_graph::{MetaConfig, Ontology, TermRepr};
    use corvid_tools::HandleProvenance;

    const TURTLE: &str = r#"
        @prefix ex: <http://example.org/> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        ex:Activity a owl:Class ; rdfs:label "Activity" .
        ex:Agent a owl:Class ; rdfs:label "Agent" .
        ex:Running rdfs:subClassOf ex:Activity .
        ex:performedBy a owl:ObjectProperty ;
            rdfs:domain ex:Activity ;
            rdfs:range ex:Agent .
    "#;

    fn verifier() -> Verifier {
        let ontology = Ontology::from_turtle(TURTLE).unwrap();
        let meta = GraphMeta::derive(&ontology, &MetaConfig::default()).unwrap();
        Verifier::new(Arc::new(meta))
    }

    fn handle_with_rows(query: &str, n: usize) -> ResultHandle {
        ResultHandle {
            name: "h".into(),
            query: query.into(),
            result: ResultSet::Rows {
                columns: vec!["s".into()],
                rows: (0..n)
                    .map(|i| {
                        vec![TermRepr::Iri {
                            iri: format!("http://e/{i}"),
                        }]
                    })
                    .collect(),
            },
            provenance: HandleProvenance::LocalOntology,
        }
    }

    #[test]
    fn resolved_prefixes_pass() {
        let v = verifier();
        let q = "SELECT ?s WHERE { ?s rdfs:label ?l } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 2)).unwrap();
        assert!(block.contains("✓ all prefixes resolve"));
        assert!(block.contains("✓ LIMIT present"));
    }

    #[test]
    fn unresolved_prefix_flagged() {
        let v = verifier();
        let q = "SELECT ?s WHERE { ?s mystery:prop ?o } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 1)).unwrap();
        assert!(block.contains("✗ prefix `mystery:`"));
    }

    #[test]
    fn in_query_declaration_counts() {
        let v = verifier();
        let q = "PREFIX mystery: <http://m.example/>\nSELECT ?s WHERE { ?s mystery:prop ?o } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 1)).unwrap();
        assert!(block.contains("✓ all prefixes resolve"));
    }

    #[test]
    fn missing_limit_warned() {
        let v = verifier();
        let q = "SELECT ?s WHERE { ?s ?p ?o }";
        let block = v.review(q, &handle_with_rows(q, 1)).unwrap();
        assert!(block.contains("⚠ SELECT without LIMIT"));
    }

    #[test]
    fn domain_violation_flagged() {
        let v = verifier();
        // ?x is typed ex:Agent but performedBy declares domain ex:Activity.
        let q = "PREFIX ex: <http://example.org/>\n\
                 SELECT ?x WHERE { ?x a ex:Agent . ?x ex:performedBy ?who } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 1)).unwrap();
        assert!(block.contains("⚠ `ex:performedBy` declares domain"));
    }

    #[test]
    fn subclass_satisfies_domain() {
        let v = verifier();
        // ex:Running specialises ex:Activity, so the domain is satisfied.
        let q = "PREFIX ex: <http://example.org/>\n\
                 SELECT ?x WHERE { ?x a ex:Running . ?x ex:performedBy ?who } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 1)).unwrap();
        assert!(!block.contains("declares domain"));
    }

    #[test]
    fn empty_with_filter_diagnosed() {
        let v = verifier();
        let q = "SELECT ?s WHERE { ?s rdfs:label ?l FILTER(CONTAINS(?l, \"zzz\")) } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 0)).unwrap();
        assert!(block.contains("✗ empty"));
        assert!(block.contains("FILTER"));
    }

    #[test]
    fn empty_with_unknown_class_diagnosed() {
        let v = verifier();
        let q = "PREFIX ex: <http://example.org/>\n\
                 SELECT ?s WHERE { ?s a ex:Nonexistent } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 0)).unwrap();
        assert!(block.contains("class `ex:Nonexistent` does not appear"));
    }

    #[test]
    fn see_also_anti_pattern() {
        let v = verifier();
        let q = "SELECT ?s WHERE { ?s rdfs:seeAlso ?o } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 1)).unwrap();
        assert!(block.contains("⚠ anti-pattern"));
        assert!(block.contains("seeAlso"));
    }

    #[test]
    fn label_filter_anti_pattern() {
        let v = verifier();
        let q = "SELECT ?s WHERE { ?s rdfs:label ?l FILTER(CONTAINS(LCASE(?l), \"run\")) } LIMIT 5";
        let block = v.review(q, &handle_with_rows(q, 1)).unwrap();
        assert!(block.contains("⚠ anti-pattern"));
        assert!(block.contains("label"));
    }

    #[test]
    fn block_is_bounded() {
        let v = verifier();
        let patterns: String = (0..200)
            .map(|i| format!("?s unknown{i}:p ?o{i} . "))
            .collect();
        let q = format!("SELECT ?s WHERE {{ {patterns} }}");
        let block = v.review(&q, &handle_with_rows(&q, 1)).unwrap();
        assert!(block.chars().count() <= FEEDBACK_MAX + 50);
        assert!(block.contains("truncated"));
    }
}
