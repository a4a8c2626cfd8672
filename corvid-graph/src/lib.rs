#![deny(missing_docs)]
//! Ontology adapter for corvid.
//!
//! Wraps an in-memory `oxigraph` store behind the narrow surface the rest
//! of the runtime needs: loading, prefix bindings, IRI resolution, graph
//! metadata derivation, and bounded SPARQL execution. Nothing outside this
//! crate touches oxigraph types — results cross the boundary as
//! [`TermRepr`] values.

pub mod error;
pub mod meta;
pub mod ontology;
pub mod sense;
pub mod term;

pub use error::GraphError;
pub use meta::{GraphMeta, MatchKind, MetaConfig, PropertyInfo};
pub use ontology::{has_limit, ConstructResult, Edge, Ontology, QueryKind, SelectResult};
pub use sense::SenseCard;
pub use term::TermRepr;
