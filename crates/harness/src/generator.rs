//! Mutation generator
//!
//! Produces one pass's writes in three phases, each batched the same way:
//!
//! 1. **Generate**: create `{_id, u: marker}` for every id the registry has
//!    not seen yet (replace with upsert).
//! 2. **Update**: for tracked ids, write the current marker into a brand new
//!    tag field, using a shape chosen by the [`ShapeSelector`].
//! 3. **Remove**: delete ids from the store and the registry.
//!
//! Ids come from injected index mappings, so a plan is reproducible while
//! marker values and tag names stay globally unique.

use std::collections::HashMap;
use std::sync::Arc;

use bson::doc;
use tracing::{debug, info};

use feedcheck_core::fields::{tag_name, ID_FIELD, MARKER_FIELD};
use feedcheck_core::{AssertedTag, DocId, Result, WriteOp};
use feedcheck_store::Store;

use crate::batch::{BatchStats, WriteBatcher};
use crate::registry::{Assignment, MarkerRegistry};
use crate::sequence::{SequenceAllocator, Sequences};
use crate::shape::ShapeSelector;

/// Index -> id mapping for the generate and remove phases
pub type IdMap = Arc<dyn Fn(usize) -> DocId + Send + Sync>;
/// Index -> (id, auxiliary scalar) mapping for the update phase
pub type IdAuxMap = Arc<dyn Fn(usize) -> (DocId, i64) + Send + Sync>;

/// Operation count plus id mapping for one phase
#[derive(Clone)]
pub struct Phase<M> {
    /// Number of indices to visit
    pub count: usize,
    /// Index mapping
    pub map: M,
}

/// Per-phase operation counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseCounts {
    /// Generate phase
    pub generate: usize,
    /// Update phase
    pub update: usize,
    /// Remove phase
    pub remove: usize,
}

impl PhaseCounts {
    /// No operations at all; a pass writes only its sentinel
    pub fn zero() -> Self {
        Self {
            generate: 0,
            update: 0,
            remove: 0,
        }
    }
}

impl Default for PhaseCounts {
    fn default() -> Self {
        Self {
            generate: 2000,
            update: 100,
            remove: 100,
        }
    }
}

/// Everything one pass writes, in phase order
#[derive(Clone)]
pub struct MutationPlan {
    /// Generate phase
    pub generate: Phase<IdMap>,
    /// Update phase
    pub update: Phase<IdAuxMap>,
    /// Remove phase
    pub remove: Phase<IdMap>,
}

impl MutationPlan {
    /// Standard mappings with the given counts:
    /// generate `i -> i`, update `i -> ((i % 21) * 10, i * 13)`, remove `i -> i * 7`.
    ///
    /// Updates revisit a small set of ids many times and removals thin the
    /// collection out afterwards.
    pub fn standard(counts: PhaseCounts) -> Self {
        Self {
            generate: Phase {
                count: counts.generate,
                map: Arc::new(|i| DocId(i as i64)),
            },
            update: Phase {
                count: counts.update,
                map: Arc::new(|i| (DocId((i as i64 % 21) * 10), i as i64 * 13)),
            },
            remove: Phase {
                count: counts.remove,
                map: Arc::new(|i| DocId(i as i64 * 7)),
            },
        }
    }
}

/// Outcome of one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    /// Operations written
    pub emitted: usize,
    /// Indices skipped (already tracked for generate, untracked for update)
    pub skipped: usize,
    /// Batches flushed
    pub batches: usize,
}

impl PhaseReport {
    fn finish(skipped: usize, stats: BatchStats) -> Self {
        Self {
            emitted: stats.ops,
            skipped,
            batches: stats.batches,
        }
    }
}

/// Outcome of a full plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorReport {
    /// Generate phase
    pub generate: PhaseReport,
    /// Update phase
    pub update: PhaseReport,
    /// Remove phase
    pub remove: PhaseReport,
    /// Ids still tracked at the end
    pub tracked: usize,
}

/// Writes one pass's mutations and keeps the ground truth for them
pub struct MutationGenerator {
    store: Arc<dyn Store>,
    registry: MarkerRegistry,
    tags: Arc<dyn SequenceAllocator>,
    shapes: Box<dyn ShapeSelector>,
    batch_ceiling: usize,
    last_tags: HashMap<DocId, AssertedTag>,
}

impl MutationGenerator {
    /// Generator with an empty registry
    pub fn new(
        store: Arc<dyn Store>,
        sequences: &Sequences,
        shapes: Box<dyn ShapeSelector>,
        batch_ceiling: usize,
    ) -> Self {
        Self {
            store,
            registry: MarkerRegistry::new(Arc::clone(&sequences.markers)),
            tags: Arc::clone(&sequences.tags),
            shapes,
            batch_ceiling,
            last_tags: HashMap::new(),
        }
    }

    /// Ground truth so far
    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    /// Last tag written to each live document by the update phase
    pub fn last_tags(&self) -> &HashMap<DocId, AssertedTag> {
        &self.last_tags
    }

    /// Run every phase of `plan` in order, stopping at the first failure.
    pub async fn run(&mut self, plan: &MutationPlan) -> Result<GeneratorReport> {
        let generate = self.generate(&plan.generate).await?;
        let update = self.update(&plan.update).await?;
        let remove = self.remove(&plan.remove).await?;
        let report = GeneratorReport {
            generate,
            update,
            remove,
            tracked: self.registry.len(),
        };
        info!(
            target: "feedcheck::generator",
            created = generate.emitted,
            updated = update.emitted,
            removed = remove.emitted,
            tracked = report.tracked,
            "Mutations written"
        );
        Ok(report)
    }

    /// Create every id in the phase that is not tracked yet.
    pub async fn generate(&mut self, phase: &Phase<IdMap>) -> Result<PhaseReport> {
        let store = Arc::clone(&self.store);
        let mut batcher = WriteBatcher::new(store.as_ref(), self.batch_ceiling);
        let mut skipped = 0;

        for i in 0..phase.count {
            let id = (phase.map)(i);
            let marker = match self.registry.assign(id) {
                Assignment::Existing(_) => {
                    skipped += 1;
                    continue;
                }
                Assignment::Fresh(marker) => marker,
            };
            batcher
                .push(WriteOp::ReplaceUpsert {
                    id,
                    document: doc! {
                        ID_FIELD: id.as_i64(),
                        MARKER_FIELD: marker.as_i64(),
                    },
                })
                .await?;
        }

        let report = PhaseReport::finish(skipped, batcher.finish().await?);
        debug!(target: "feedcheck::generator", ?report, "Generate phase done");
        Ok(report)
    }

    /// Tag every tracked id in the phase with its current marker.
    pub async fn update(&mut self, phase: &Phase<IdAuxMap>) -> Result<PhaseReport> {
        let store = Arc::clone(&self.store);
        let mut batcher = WriteBatcher::new(store.as_ref(), self.batch_ceiling);
        let mut skipped = 0;

        for i in 0..phase.count {
            let (id, aux) = (phase.map)(i);
            let Some(marker) = self.registry.lookup(id) else {
                // Updates never upsert, so an untracked id has nothing to update
                skipped += 1;
                continue;
            };

            let tag = tag_name(self.tags.next());
            let shape = self.shapes.select(i);
            let change = shape.build(&tag, marker, aux, bson::DateTime::now());
            self.last_tags.insert(id, AssertedTag { field: tag, marker });
            batcher.push(WriteOp::Update { id, change }).await?;
        }

        let report = PhaseReport::finish(skipped, batcher.finish().await?);
        debug!(target: "feedcheck::generator", ?report, "Update phase done");
        Ok(report)
    }

    /// Delete every id in the phase from the store and the registry.
    pub async fn remove(&mut self, phase: &Phase<IdMap>) -> Result<PhaseReport> {
        let store = Arc::clone(&self.store);
        let mut batcher = WriteBatcher::new(store.as_ref(), self.batch_ceiling);

        for i in 0..phase.count {
            let id = (phase.map)(i);
            self.registry.remove(id);
            self.last_tags.remove(&id);
            batcher.push(WriteOp::Delete { id }).await?;
        }

        let report = PhaseReport::finish(0, batcher.finish().await?);
        debug!(target: "feedcheck::generator", ?report, "Remove phase done");
        Ok(report)
    }
}
