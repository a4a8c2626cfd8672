//! The wire representation of RDF terms.
//!
//! Oxigraph terms stay inside this crate; everything downstream (handles,
//! previews, evidence maps) sees [`TermRepr`].

use oxigraph::model::{Subject, Term};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A serializable RDF term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TermRepr {
    /// A named node.
    Iri {
        /// The absolute IRI.
        iri: String,
    },
    /// A literal value.
    Literal {
        /// The lexical value.
        value: String,
        /// Datatype IRI, absent for plain/string literals.
        #[serde(skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        /// Language tag, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
    /// A blank node.
    Blank {
        /// The blank node label.
        label: String,
    },
    /// An unbound variable in a solution row.
    Unbound,
}

impl TermRepr {
    /// Build from an oxigraph term.
    pub fn from_term(term: &Term) -> Self {
        match term {
            Term::NamedNode(n) => TermRepr::Iri {
                iri: n.as_str().to_string(),
            },
            Term::Literal(l) => {
                let lang = l.language().map(|s| s.to_string());
                let datatype = if lang.is_some() || l.datatype().as_str() == XSD_STRING {
                    None
                } else {
                    Some(l.datatype().as_str().to_string())
                };
                TermRepr::Literal {
                    value: l.value().to_string(),
                    datatype,
                    lang,
                }
            }
            Term::BlankNode(b) => TermRepr::Blank {
                label: b.as_str().to_string(),
            },
            #[allow(unreachable_patterns)]
            _ => TermRepr::Unbound,
        }
    }

    /// Build from a triple/quad subject.
    pub fn from_subject(subject: &Subject) -> Self {
        match subject {
            Subject::NamedNode(n) => TermRepr::Iri {
                iri: n.as_str().to_string(),
            },
            Subject::BlankNode(b) => TermRepr::Blank {
                label: b.as_str().to_string(),
            },
            #[allow(unreachable_patterns)]
            _ => TermRepr::Unbound,
        }
    }

    /// The IRI if this is a named node.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            TermRepr::Iri { iri } => Some(iri),
            _ => None,
        }
    }

    /// The lexical value if this is a literal.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            TermRepr::Literal { value, .. } => Some(value),
            _ => None,
        }
    }
}

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

impl fmt::Display for TermRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermRepr::Iri { iri } => write!(f, "<{iri}>"),
            TermRepr::Literal {
                value,
                datatype,
                lang,
            } => {
                write!(f, "\"{value}\"")?;
                if let Some(lang) = lang {
                    write!(f, "@{lang}")?;
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")?;
                }
                Ok(())
            }
            TermRepr::Blank { label } => write!(f, "_:{label}"),
            TermRepr::Unbound => write!(f, "UNBOUND"),
        }
    }
}
