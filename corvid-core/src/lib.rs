//! # corvid-core — protocol types for the corvid runtime
//!
//! This crate defines the data model shared by every corvid component:
//!
//! | Area | Types | What it covers |
//! |------|-------|----------------|
//! | Identity | [`RunId`], [`TrajectoryId`], [`MemoryId`], [`OntologyId`] | Typed id wrappers |
//! | Trajectory | [`IterationEntry`], [`Trajectory`], [`ErrorClass`] | The append-only record of one run |
//! | Judgment | [`Judgment`], [`Confidence`] | Post-run success assessment |
//! | Memory | [`MemoryItem`], [`MemoryScope`], [`Provenance`], [`MemoryUsage`] | The ReasoningBank unit of procedural knowledge |
//! | Signature | [`Signature`], [`OutputField`], [`Prediction`] | The driver's typed input/output contract |
//!
//! ## Design Principle
//!
//! Types here are operation-defined, not backend-defined. A [`MemoryItem`]'s
//! identifier is a pure function of its immutable content fields, so any two
//! stores that receive the same item agree on its identity; counters live
//! apart from identity and may drift freely.
//!
//! ## Dependency Notes
//!
//! `serde_json::Value` is used for open-ended payloads (terminal outputs,
//! evidence maps). JSON is the interchange format of the surrounding agentic
//! ecosystem, and `Value` keeps trait objects simple.

#![deny(missing_docs)]

pub mod error;
pub mod id;
pub mod judgment;
pub mod memory;
pub mod signature;
pub mod trajectory;

pub use error::{DriverError, StoreError};
pub use id::{MemoryId, OntologyId, RunId, TrajectoryId};
pub use judgment::{Confidence, Judgment};
pub use memory::{
    ComplexityLevel, MemoryItem, MemoryScope, MemoryUsage, Provenance, ReasoningStep, SourceType,
};
pub use signature::{FieldKind, InputField, OutputField, Prediction, Signature};
pub use trajectory::{ErrorClass, FinishReason, IterationEntry, Trajectory};
