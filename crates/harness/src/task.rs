//! Generator task and completion token
//!
//! The generator runs on its own task. Whatever happens to it (success,
//! error, panic) the sentinel document is written afterwards and a
//! [`Completion`] is sent, so the consumer always learns whether its
//! termination signal is on the way.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use bson::oid::ObjectId;
use bson::{doc, Document};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use feedcheck_core::fields::ID_FIELD;
use feedcheck_core::{Error, Result};
use feedcheck_store::Store;

use crate::generator::{GeneratorReport, MutationGenerator, MutationPlan};

/// How the generator's own work ended
#[derive(Debug)]
pub enum GeneratorOutcome {
    /// Every phase ran
    Completed(GeneratorReport),
    /// A phase failed; later phases were not attempted
    Failed(Error),
    /// The generator panicked
    Panicked(String),
}

impl GeneratorOutcome {
    /// True for [`GeneratorOutcome::Completed`]
    pub fn is_completed(&self) -> bool {
        matches!(self, GeneratorOutcome::Completed(_))
    }
}

/// Sent once per pass after the sentinel write was attempted
#[derive(Debug)]
pub struct Completion {
    /// Generator result
    pub outcome: GeneratorOutcome,
    /// When the generator's own work ended, before the sentinel write
    pub finished_at: Instant,
    /// Sentinel write result
    pub sentinel: Result<()>,
}

/// The sentinel document for `id`
pub fn sentinel_document(id: ObjectId) -> Document {
    doc! { ID_FIELD: id }
}

/// Run `generator` over `plan` on a new task, then write the sentinel.
///
/// The returned receiver yields exactly one [`Completion`].
pub fn spawn_generator(
    store: Arc<dyn Store>,
    mut generator: MutationGenerator,
    plan: MutationPlan,
    sentinel: ObjectId,
) -> (JoinHandle<()>, oneshot::Receiver<Completion>) {
    let (tx, rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        // The inner task isolates panics so the sentinel is still written
        let work = tokio::spawn(async move { generator.run(&plan).await });
        let outcome = match work.await {
            Ok(Ok(report)) => GeneratorOutcome::Completed(report),
            Ok(Err(e)) => {
                warn!(target: "feedcheck::generator", error = %e, "Generator stopped early");
                GeneratorOutcome::Failed(e)
            }
            Err(join) => {
                let message = if join.is_panic() {
                    panic_message(join.into_panic())
                } else {
                    "generator task cancelled".to_string()
                };
                error!(target: "feedcheck::generator", %message, "Generator panicked");
                GeneratorOutcome::Panicked(message)
            }
        };
        let finished_at = Instant::now();

        let written = store
            .insert_one(sentinel_document(sentinel))
            .await
            .map_err(|e| Error::SentinelWrite(e.to_string()));
        match &written {
            Ok(()) => info!(target: "feedcheck::generator", %sentinel, "Sentinel written"),
            Err(e) => error!(target: "feedcheck::generator", error = %e, "Sentinel write failed"),
        }

        // The consumer may already have given up; nothing left to tell it
        let _ = tx.send(Completion {
            outcome,
            finished_at,
            sentinel: written,
        });
    });

    (handle, rx)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
