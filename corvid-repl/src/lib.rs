#![deny(missing_docs)]
//! Code interpreter for the corvid REPL loop.
//!
//! The model emits short snippets in a small statement language:
//!
//! ```text
//! ents = search_entity("Activity", limit=5)
//! print(ents)
//! h = sparql_local("SELECT ?c WHERE { ?c rdfs:subClassOf prov:Activity }", name="subs")
//! SUBMIT(answer="...", sparql="...", evidence={"class": "prov:Activity"})
//! ```
//!
//! One statement per line (bracketed expressions may span lines);
//! values are JSON values; calls dispatch to the bounded tool registry.
//! A snippet ends in one of three ways, surfaced as an
//! [`ExecutionOutcome`]:
//!
//! - [`ExecutionOutcome::Terminal`] — the snippet called `SUBMIT(...)`
//!   (or `FINAL`/`FINAL_VAR`); the keyword payload is the run's result.
//! - [`ExecutionOutcome::Text`] — normal completion; the captured,
//!   size-bounded output.
//! - [`ExecutionOutcome::RecoverableError`] — anything went wrong in
//!   user code; the loop continues with the error as the step output.
//!
//! The termination surface is a sentinel outcome value; internally the
//! evaluator short-circuits with a control-flow variant, which never
//! escapes this crate. The namespace persists across `execute` calls
//! for the duration of one run; the interpreter is not reentrant.

mod interp;
mod lexer;
mod outcome;
mod parser;

pub use interp::{Interpreter, OUTPUT_LIMIT_DEFAULT};
pub use outcome::ExecutionOutcome;
