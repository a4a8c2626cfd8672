//! Tolerant lexical scan of a SPARQL query.
//!
//! This is deliberately not a SPARQL parser: it recovers just enough
//! structure (prefix declarations, prefixed-name uses, triple patterns,
//! `rdf:type` assignments, FILTER presence) for the checks to fire.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// One loosely-recovered triple pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct TriplePattern {
    /// Subject token (`?var`, `<iri>`, or `pfx:local`).
    pub subject: String,
    /// Predicate token (`a`, `?var`, `<iri>`, or `pfx:local`).
    pub predicate: String,
    /// Object token (`?var`, `<iri>`, `pfx:local`, or a string literal).
    pub object: String,
}

/// The recovered facts about one query.
#[derive(Debug, Clone, Default)]
pub struct QueryScan {
    /// Prefixes declared in the query itself.
    pub declared_prefixes: BTreeSet<String>,
    /// Declared prefix → namespace bindings.
    pub declared_bindings: BTreeMap<String, String>,
    /// Every prefix used in a prefixed name, in order of appearance.
    pub used_prefixes: Vec<String>,
    /// Recovered triple patterns.
    pub patterns: Vec<TriplePattern>,
    /// `?var` → raw type token, from `?var a Type` / `?var rdf:type Type`.
    pub typed_vars: BTreeMap<String, String>,
    /// Whether the query contains a FILTER.
    pub has_filter: bool,
    /// The original query text (for rule checks).
    pub text: String,
}

fn prefix_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bPREFIX\s+([A-Za-z_][\w-]*)?\s*:\s*<([^>]*)>").expect("static regex")
    })
}

fn used_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z][\w-]*):").expect("static regex"))
}

fn triple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let term = r#"(\?\w+|<[^>\s]+>|[A-Za-z_][\w-]*:[\w.-]+|a|"[^"]*")"#;
        Regex::new(&format!(r"{term}\s+{term}\s+{term}")).expect("static regex")
    })
}

/// Replace string literal contents with empty strings so their text
/// never triggers token scans.
fn strip_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' || c == '\'' {
            out.push('"');
            for inner in chars.by_ref() {
                if inner == c {
                    break;
                }
            }
            out.push('"');
        } else {
            out.push(c);
        }
    }
    out
}

impl QueryScan {
    /// Scan a query.
    pub fn of(query: &str) -> Self {
        let mut scan = QueryScan {
            text: query.to_string(),
            ..QueryScan::default()
        };

        for captures in prefix_decl_re().captures_iter(query) {
            let prefix = captures
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let iri = captures[2].to_string();
            scan.declared_prefixes.insert(prefix.clone());
            scan.declared_bindings.insert(prefix, iri);
        }

        let stripped = strip_strings(query);
        // Drop declaration lines and angle-bracket IRIs before scanning
        // for prefixed-name uses (an IRI's scheme is not a prefix).
        let mut scannable = String::new();
        for line in stripped.lines() {
            if prefix_decl_re().is_match(line) {
                scannable.push_str(&prefix_decl_re().replace_all(line, " "));
            } else {
                scannable.push_str(line);
            }
            scannable.push('\n');
        }
        let no_iris = Regex::new(r"<[^>\s]*>")
            .expect("static regex")
            .replace_all(&scannable, " ");
        for captures in used_prefix_re().captures_iter(&no_iris) {
            scan.used_prefixes.push(captures[1].to_string());
        }

        scan.has_filter = Regex::new(r"(?i)\bFILTER\b")
            .expect("static regex")
            .is_match(&stripped);

        if let (Some(open), Some(close)) = (stripped.find('{'), stripped.rfind('}')) {
            if open < close {
                let body = &stripped[open + 1..close];
                for captures in triple_re().captures_iter(body) {
                    let pattern = TriplePattern {
                        subject: captures[1].to_string(),
                        predicate: captures[2].to_string(),
                        object: captures[3].to_string(),
                    };
                    if pattern.subject.starts_with('?')
                        && (pattern.predicate == "a"
                            || pattern.predicate == "rdf:type"
                            || pattern.predicate
                                == "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>")
                    {
                        scan.typed_vars
                            .insert(pattern.subject.clone(), pattern.object.clone());
                    }
                    scan.patterns.push(pattern);
                }
            }
        }
        scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_and_uses() {
        let scan = QueryScan::of(
            "PREFIX ex: <http://example.org/>\nSELECT ?s WHERE { ?s ex:p ?o . ?s other:q ?o }",
        );
        assert!(scan.declared_prefixes.contains("ex"));
        assert_eq!(
            scan.declared_bindings.get("ex").unwrap(),
            "http://example.org/"
        );
        assert!(scan.used_prefixes.contains(&"ex".to_string()));
        assert!(scan.used_prefixes.contains(&"other".to_string()));
    }

    #[test]
    fn iri_schemes_are_not_prefixes() {
        let scan = QueryScan::of("SELECT ?s WHERE { ?s <http://example.org/p> ?o }");
        assert!(!scan.used_prefixes.contains(&"http".to_string()));
    }

    #[test]
    fn string_contents_ignored() {
        let scan = QueryScan::of(r#"SELECT ?s WHERE { ?s ?p "fake:prefix inside" }"#);
        assert!(scan.used_prefixes.is_empty());
    }

    #[test]
    fn triple_patterns_recovered() {
        let scan = QueryScan::of(
            "SELECT ?x WHERE { ?x a ex:Agent . ?x ex:performedBy ?who }",
        );
        assert_eq!(scan.patterns.len(), 2);
        assert_eq!(scan.typed_vars.get("?x").unwrap(), "ex:Agent");
    }

    #[test]
    fn filter_detected() {
        assert!(QueryScan::of("SELECT ?s WHERE { ?s ?p ?o FILTER(?o > 3) }").has_filter);
        assert!(!QueryScan::of("SELECT ?s WHERE { ?s ?p ?o }").has_filter);
    }

    #[test]
    fn empty_default_prefix_declaration() {
        let scan = QueryScan::of("PREFIX : <http://example.org/>\nSELECT ?s WHERE { ?s :p ?o }");
        assert!(scan.declared_prefixes.contains(""));
    }
}
