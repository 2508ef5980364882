//! Write batching
//!
//! Every generator phase accumulates operations here. A batch is flushed as
//! soon as it reaches the ceiling and once more at phase end for any
//! remainder. A failed flush is returned as-is: a partially applied batch is
//! not idempotent, so it is never retried.

use std::mem;

use feedcheck_core::{Result, WriteOp};
use feedcheck_store::Store;
use tracing::trace;

/// Counters for one batcher's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Flushed batches
    pub batches: usize,
    /// Operations across all flushed batches
    pub ops: usize,
}

/// Accumulates writes and flushes them in ceiling-sized batches
pub struct WriteBatcher<'a> {
    store: &'a dyn Store,
    ceiling: usize,
    pending: Vec<WriteOp>,
    stats: BatchStats,
}

impl<'a> WriteBatcher<'a> {
    /// Batcher that flushes to `store` every `ceiling` operations.
    ///
    /// A ceiling of 0 is treated as 1.
    pub fn new(store: &'a dyn Store, ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            store,
            ceiling,
            pending: Vec::with_capacity(ceiling),
            stats: BatchStats::default(),
        }
    }

    /// Queue `op`, flushing if the batch is now full.
    pub async fn push(&mut self, op: WriteOp) -> Result<()> {
        self.pending.push(op);
        if self.pending.len() >= self.ceiling {
            self.flush().await?;
        }
        Ok(())
    }

    /// Operations queued but not yet flushed
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Flush the remainder and return the totals.
    pub async fn finish(mut self) -> Result<BatchStats> {
        self.flush().await?;
        Ok(self.stats)
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = mem::replace(&mut self.pending, Vec::with_capacity(self.ceiling));
        self.store.bulk_write(&batch).await?;
        self.stats.batches += 1;
        self.stats.ops += batch.len();
        trace!(target: "feedcheck::generator", ops = batch.len(), "Flushed batch");
        Ok(())
    }
}
