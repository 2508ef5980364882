//! Core types for feedcheck
//!
//! This crate defines the vocabulary shared by the store bindings and the
//! harness:
//! - DocId / Marker / DocKey / Namespace: identifiers and logical versions
//! - ChangeEvent: one notification from a change feed
//! - WriteOp / UpdateSpec: elements of a batched write
//! - fields: the naming convention that links events back to markers
//! - Error: error taxonomy for the harness

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod fields;
pub mod types;
pub mod write;

pub use error::{Error, Result, ALREADY_INITIALIZED};
pub use event::{AssertedTag, ChangeEvent, OperationKind, UpdateDescription};
pub use types::{DocId, DocKey, Marker, Namespace};
pub use write::{UpdateSpec, WriteKind, WriteOp};

// Re-export the document model so downstream crates agree on one bson version
pub use bson;
