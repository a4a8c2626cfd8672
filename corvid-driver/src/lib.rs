#![deny(missing_docs)]
//! RLM iteration driver.
//!
//! Given a typed input/output contract ([`corvid_core::Signature`]) and a
//! tool set, runs the bounded loop: render instructions + history → ask
//! the root model for one code block → execute it in the interpreter →
//! append to the trajectory → repeat until a validated terminal call or
//! budget exhaustion. On exhaustion (or two consecutive empty steps) a
//! single extract-fallback completion produces a best-effort terminal
//! payload and the [`corvid_core::Prediction`] carries `converged =
//! false`.
//!
//! Model-side failures are retried a bounded number of times with
//! backoff; persistent failure is fatal. Tool and interpreter failures
//! never leave the loop.

mod config;
mod driver;
mod parse;
mod prompt;

pub use config::DriverConfig;
pub use driver::RlmDriver;
pub use parse::ParsedResponse;
