//! The anti-pattern rule library.
//!
//! Each rule is a structural check over the query scan; matches emit one
//! `⚠ anti-pattern:` line. Procedural memories may carry further,
//! ontology-specific rules — this library is the floor, not the ceiling.

use crate::scan::QueryScan;
use regex::Regex;
use std::sync::OnceLock;

/// Predicates that link entities without semantics; traversing them as
/// if they were typed relations is a classic wrong turn.
const GENERIC_LINK_MARKERS: &[&str] = &[
    "seeAlso",
    "hasDbXref",
    "xref",
    "skos:related",
    "dcterms:references",
];

const LABEL_MARKERS: &[&str] = &["label", "prefLabel", "name", "title"];

fn string_fn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(CONTAINS|REGEX|STRSTARTS|STRENDS)\s*\(").expect("static regex")
    })
}

/// Run every rule, appending matched lines.
pub fn check_anti_patterns(scan: &QueryScan, lines: &mut Vec<String>) {
    see_also_as_link(scan, lines);
    label_string_filtering(scan, lines);
    generic_cross_reference(scan, lines);
}

fn see_also_as_link(scan: &QueryScan, lines: &mut Vec<String>) {
    if scan
        .patterns
        .iter()
        .any(|p| p.predicate.contains("seeAlso"))
    {
        lines.push(
            "⚠ anti-pattern: rdfs:seeAlso is a documentation pointer, not a semantic link; \
             use a typed predicate"
                .into(),
        );
    }
}

fn label_string_filtering(scan: &QueryScan, lines: &mut Vec<String>) {
    if !scan.has_filter || !string_fn_re().is_match(&scan.text) {
        return;
    }
    let filters_a_label = scan.patterns.iter().any(|p| {
        LABEL_MARKERS
            .iter()
            .any(|marker| p.predicate.contains(marker))
            && p.object.starts_with('?')
    });
    if filters_a_label {
        lines.push(
            "⚠ anti-pattern: label-based string filtering; where a typed predicate exists, \
             match it directly (or find identifiers with search_entity first)"
                .into(),
        );
    }
}

fn generic_cross_reference(scan: &QueryScan, lines: &mut Vec<String>) {
    let uses_generic = scan.patterns.iter().any(|p| {
        GENERIC_LINK_MARKERS
            .iter()
            .any(|marker| !marker.contains("seeAlso") && p.predicate.contains(marker))
    });
    if uses_generic {
        lines.push(
            "⚠ anti-pattern: generic cross-reference predicate between typed entities; \
             traverse the intermediate annotation node the schema provides"
                .into(),
        );
    }
}
