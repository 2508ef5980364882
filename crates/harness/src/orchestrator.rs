//! Pass orchestration
//!
//! A pass is strictly sequential from the orchestrator's point of view:
//!
//! 1. drop the collection and shard it again
//! 2. subscribe to the feed (before any write, so nothing is missed)
//! 3. spawn the generator task with a fresh registry and a new sentinel
//! 4. drain the feed until the sentinel arrives
//! 5. close the feed, collect the generator's outcome, add to the totals
//!
//! Passes never overlap: the next one starts only after the previous feed
//! has been closed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bson::oid::ObjectId;
use tracing::{error, info, warn};

use feedcheck_core::{DocKey, Error, Result};
use feedcheck_store::Store;

use crate::admin::reset_collection;
use crate::config::HarnessConfig;
use crate::consumer::{CompletionWatch, FeedConsumer, PassTally};
use crate::generator::{MutationGenerator, MutationPlan};
use crate::sequence::Sequences;
use crate::task::{spawn_generator, GeneratorOutcome};

/// Outcome of one pass
#[derive(Debug)]
pub struct PassReport {
    /// Pass number, starting at 1
    pub pass: u64,
    /// What the consumer saw
    pub tally: PassTally,
    /// How the generator ended
    pub generator: GeneratorOutcome,
    /// Time from the end of the generator's work to the sentinel being
    /// consumed (zero if the feed caught up first)
    pub sentinel_lag: Duration,
}

impl PassReport {
    /// Inconsistencies found in this pass
    pub fn inconsistencies(&self) -> usize {
        self.tally.inconsistencies
    }

    /// Update events that arrived without the requested snapshot
    pub fn snapshots_missing(&self) -> usize {
        self.tally.snapshots_missing
    }
}

/// Running totals across passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    /// Passes completed
    pub passes: u64,
    /// Inconsistencies across all passes
    pub inconsistencies: usize,
}

/// Drives passes against one store
pub struct Orchestrator {
    store: Arc<dyn Store>,
    config: HarnessConfig,
    plan: MutationPlan,
    sequences: Sequences,
    totals: RunTotals,
}

impl Orchestrator {
    /// Orchestrator with process-fresh sequences.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` does not validate.
    pub fn new(store: Arc<dyn Store>, config: HarnessConfig) -> Result<Self> {
        Self::with_sequences(store, config, Sequences::new())
    }

    /// Orchestrator drawing markers and tag names from `sequences`.
    pub fn with_sequences(
        store: Arc<dyn Store>,
        config: HarnessConfig,
        sequences: Sequences,
    ) -> Result<Self> {
        config.validate()?;
        let plan = MutationPlan::standard(config.counts());
        Ok(Self {
            store,
            config,
            plan,
            sequences,
            totals: RunTotals::default(),
        })
    }

    /// Totals so far
    pub fn totals(&self) -> RunTotals {
        self.totals
    }

    /// Allocators shared by every pass
    pub fn sequences(&self) -> &Sequences {
        &self.sequences
    }

    /// One-time database setup before the first pass.
    pub async fn prepare(&self) -> Result<()> {
        self.store.enable_sharding().await?;
        info!(
            target: "feedcheck::pass",
            database = %self.store.namespace().database,
            "Sharding enabled"
        );
        Ok(())
    }

    /// Run passes until `max_passes` is reached, or forever when unset.
    ///
    /// # Errors
    ///
    /// Stops at the first fatal error; totals up to that point stay
    /// available through [`Orchestrator::totals`].
    pub async fn run(&mut self) -> Result<RunTotals> {
        self.prepare().await?;
        loop {
            if let Some(max) = self.config.max_passes {
                if self.totals.passes >= max {
                    return Ok(self.totals);
                }
            }
            self.run_pass().await?;
        }
    }

    /// Run exactly one pass.
    pub async fn run_pass(&mut self) -> Result<PassReport> {
        let pass = self.totals.passes + 1;
        let store = Arc::clone(&self.store);

        reset_collection(store.as_ref()).await?;
        let mut feed = store.watch(&self.config.feed_options()).await?;

        let sentinel = ObjectId::new();
        let generator = MutationGenerator::new(
            Arc::clone(&store),
            &self.sequences,
            self.config.shapes.selector(pass),
            self.config.batch_ceiling,
        );
        let (handle, completion) =
            spawn_generator(Arc::clone(&store), generator, self.plan.clone(), sentinel);
        let mut completion = CompletionWatch::new(completion);

        let consumer = FeedConsumer::new(store.as_ref(), DocKey::Object(sentinel));
        let drained = consumer.drain(feed.as_mut(), &mut completion).await;
        let drained_at = Instant::now();
        if let Err(e) = feed.close().await {
            warn!(target: "feedcheck::pass", pass, error = %e, "Closing feed failed");
        }
        let tally = drained?;

        let finished = completion.wait().await?;
        let sentinel_lag = drained_at.saturating_duration_since(finished.finished_at);
        if handle.await.is_err() {
            return Err(Error::GeneratorLost);
        }

        self.totals.passes = pass;
        self.totals.inconsistencies += tally.inconsistencies;

        if tally.inconsistencies == 0 {
            info!(
                target: "feedcheck::pass",
                pass,
                events = tally.events,
                checked = tally.updates_checked,
                snapshots_missing = tally.snapshots_missing,
                total_errors = self.totals.inconsistencies,
                "test passed"
            );
        } else {
            error!(
                target: "feedcheck::pass",
                pass,
                errors = tally.inconsistencies,
                snapshots_missing = tally.snapshots_missing,
                total_errors = self.totals.inconsistencies,
                "test failed with {} errors",
                tally.inconsistencies
            );
        }

        Ok(PassReport {
            pass,
            tally,
            generator: finished.outcome,
            sentinel_lag,
        })
    }
}
