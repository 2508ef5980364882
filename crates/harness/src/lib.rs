//! Change feed consistency harness
//!
//! This crate runs verification passes against a [`Store`](feedcheck_store::Store):
//! - [`MutationGenerator`]: batched create/update/delete phases with a marker registry as ground truth
//! - [`FeedConsumer`]: reconciles snapshot-less update events against point reads
//! - [`spawn_generator`]: runs the generator and always writes the end-of-pass sentinel
//! - [`Orchestrator`]: drives sequential passes and keeps the running totals
//!
//! Markers and tag names come from process-wide [`Sequences`], so they are
//! never reused across passes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod batch;
pub mod config;
pub mod consumer;
pub mod generator;
pub mod orchestrator;
pub mod registry;
pub mod sequence;
pub mod shape;
pub mod task;

pub use admin::{ensure_sharded, reset_collection, shard_key};
pub use batch::{BatchStats, WriteBatcher};
pub use config::{HarnessConfig, CONFIG_FILE_NAME};
pub use consumer::{CompletionWatch, FeedConsumer, PassTally, SkipReason, Verdict};
pub use generator::{
    GeneratorReport, IdAuxMap, IdMap, MutationGenerator, MutationPlan, Phase, PhaseCounts,
    PhaseReport,
};
pub use orchestrator::{Orchestrator, PassReport, RunTotals};
pub use registry::{Assignment, MarkerRegistry};
pub use sequence::{AtomicSequence, SequenceAllocator, Sequences};
pub use shape::{
    CyclingShapes, FixedShape, ShapeSelector, ShapeStrategy, UniformShapes, UpdateShape,
};
pub use task::{sentinel_document, spawn_generator, Completion, GeneratorOutcome};
