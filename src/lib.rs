//! feedcheck - consistency harness for change streams
//!
//! Repeatedly mutates a sharded collection while draining its change stream,
//! and checks every update event that arrives without a post-image against a
//! fresh point read of the document.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use feedcheck::{HarnessConfig, MemoryStore, Namespace, Orchestrator};
//!
//! let store = Arc::new(MemoryStore::new(Namespace::new("test", "example1")));
//! let config = HarnessConfig { max_passes: Some(1), ..HarnessConfig::default() };
//! let totals = Orchestrator::new(store, config)?.run().await?;
//! assert_eq!(totals.inconsistencies, 0);
//! ```
//!
//! # Architecture
//!
//! - `feedcheck-core`: errors, keys, events and write operations
//! - `feedcheck-store`: the [`Store`] / [`ChangeFeed`] seam, with MongoDB and in-memory implementations
//! - `feedcheck-harness`: generator, consumer and pass orchestration

pub use feedcheck_core::*;
pub use feedcheck_harness::*;
pub use feedcheck_store::*;
