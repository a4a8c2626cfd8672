//! Error type for the ontology adapter.

use thiserror::Error;

/// Errors from ontology loading, resolution, and query execution.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GraphError {
    /// The ontology file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The ontology could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),

    /// A SPARQL query was malformed or failed to evaluate.
    #[error("query error: {0}")]
    Query(String),

    /// A prefixed name used an unknown prefix.
    #[error("unknown prefix: {0}")]
    UnknownPrefix(String),

    /// A string could not be resolved to an IRI.
    #[error("bad iri: {0}")]
    BadIri(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(
            GraphError::UnknownPrefix("exx".into()).to_string(),
            "unknown prefix: exx"
        );
        assert_eq!(
            GraphError::Query("bad syntax".into()).to_string(),
            "query error: bad syntax"
        );
    }
}
