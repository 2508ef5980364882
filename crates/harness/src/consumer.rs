//! Change feed consumer
//!
//! Drains one pass's feed in delivery order and reconciles every update event
//! that arrives without a post-mutation snapshot:
//!
//! ```text
//! sentinel key?                 -> done
//! update without snapshot?      -> find the asserted tag in the changed fields
//!   no tag                      -> skip (benign)
//!   point read finds nothing    -> skip (removed since; benign)
//!   tag missing or different    -> inconsistency
//!   tag equal                   -> consistent
//! ```
//!
//! Expectations come only from what the store reports. The generator's
//! registry is never consulted.
//!
//! The generator's completion token is checked on every idle wake. It never
//! ends a pass by itself; it only turns a lost sentinel into an error instead
//! of an endless wait.

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, error, info, warn};

use feedcheck_core::fields::marker_field;
use feedcheck_core::{ChangeEvent, DocKey, Error, Marker, Result};
use feedcheck_store::{ChangeFeed, FeedPoll, Store};

use crate::task::Completion;

/// Why an update was not reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The event names no tag field
    NoTag,
    /// The document no longer exists
    DocumentGone,
    /// The point read itself failed
    ReadFailed,
}

/// Result of checking one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Not an update, or the store attached a snapshot
    NotChecked,
    /// The live document agrees with the event
    Consistent,
    /// The live document disagrees with the event
    Inconsistent {
        /// Tag field asserted by the event
        field: String,
        /// Marker asserted by the event
        expected: Marker,
        /// Marker found in the live document, if any
        found: Option<Marker>,
    },
    /// Could not be reconciled, for a benign reason
    Skipped(SkipReason),
}

/// What a consumer saw during one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassTally {
    /// Events received, sentinel included
    pub events: usize,
    /// Update events delivered without a snapshot, whatever the read showed
    pub snapshots_missing: usize,
    /// Updates reconciled against a point read
    pub updates_checked: usize,
    /// Updates skipped for a benign reason
    pub benign_skips: usize,
    /// Point reads that failed
    pub read_failures: usize,
    /// Reconciliation failures (the findings)
    pub inconsistencies: usize,
    /// Polls that returned no event
    pub idle_polls: usize,
}

impl PassTally {
    fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::NotChecked => {}
            Verdict::Consistent => self.updates_checked += 1,
            Verdict::Inconsistent { .. } => {
                self.updates_checked += 1;
                self.inconsistencies += 1;
            }
            Verdict::Skipped(reason) => {
                self.benign_skips += 1;
                if *reason == SkipReason::ReadFailed {
                    self.read_failures += 1;
                }
            }
        }
    }
}

/// Observes the generator's completion token without blocking the feed
pub struct CompletionWatch {
    receiver: Option<oneshot::Receiver<Completion>>,
    received: Option<Completion>,
}

impl CompletionWatch {
    /// Watch `receiver`
    pub fn new(receiver: oneshot::Receiver<Completion>) -> Self {
        Self {
            receiver: Some(receiver),
            received: None,
        }
    }

    /// True once the generator has reported
    pub fn has_completed(&self) -> bool {
        self.received.is_some()
    }

    /// Non-blocking check.
    ///
    /// # Errors
    ///
    /// Fails if the generator reported a failed sentinel write, or went away
    /// without reporting: in both cases the sentinel will never arrive.
    pub fn check(&mut self) -> Result<()> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(());
        };
        match receiver.try_recv() {
            Ok(completion) => {
                self.receiver = None;
                self.accept(completion)
            }
            Err(TryRecvError::Empty) => Ok(()),
            Err(TryRecvError::Closed) => {
                self.receiver = None;
                Err(Error::GeneratorLost)
            }
        }
    }

    /// Wait for the generator to report.
    pub async fn wait(mut self) -> Result<Completion> {
        if let Some(receiver) = self.receiver.take() {
            let completion = receiver.await.map_err(|_| Error::GeneratorLost)?;
            self.accept(completion)?;
        }
        self.received.ok_or(Error::GeneratorLost)
    }

    fn accept(&mut self, mut completion: Completion) -> Result<()> {
        if let Err(e) = std::mem::replace(&mut completion.sentinel, Ok(())) {
            return Err(e);
        }
        self.received = Some(completion);
        Ok(())
    }
}

/// Reconciles one pass's feed against the store
pub struct FeedConsumer<'a> {
    store: &'a dyn Store,
    sentinel: DocKey,
}

impl<'a> FeedConsumer<'a> {
    /// Consumer that stops at `sentinel` and reads documents from `store`
    pub fn new(store: &'a dyn Store, sentinel: DocKey) -> Self {
        Self { store, sentinel }
    }

    /// Decide whether `event` is consistent with the store's current state.
    pub async fn check_event(&self, event: &ChangeEvent) -> Verdict {
        if !event.is_update() || event.has_snapshot() {
            return Verdict::NotChecked;
        }
        let Some(asserted) = event.asserted_tag() else {
            return Verdict::Skipped(SkipReason::NoTag);
        };

        let document = match self.store.find_one(&event.key).await {
            Ok(Some(document)) => document,
            Ok(None) => return Verdict::Skipped(SkipReason::DocumentGone),
            Err(e) => {
                warn!(target: "feedcheck::consumer", key = %event.key, error = %e, "Point read failed");
                return Verdict::Skipped(SkipReason::ReadFailed);
            }
        };

        match marker_field(&document, &asserted.field) {
            Some(found) if found == asserted.marker => Verdict::Consistent,
            found => Verdict::Inconsistent {
                field: asserted.field,
                expected: asserted.marker,
                found,
            },
        }
    }

    /// Drain `feed` until the sentinel arrives.
    ///
    /// # Errors
    ///
    /// Feed failures, a feed that closes before the sentinel, and a lost
    /// sentinel (see [`CompletionWatch::check`]) are all fatal.
    pub async fn drain(
        &self,
        feed: &mut dyn ChangeFeed,
        completion: &mut CompletionWatch,
    ) -> Result<PassTally> {
        let mut tally = PassTally::default();
        loop {
            match feed.poll_next().await? {
                FeedPoll::Event(event) => {
                    tally.events += 1;
                    if event.key == self.sentinel {
                        info!(target: "feedcheck::consumer", sentinel = %self.sentinel, "Sentinel received");
                        return Ok(tally);
                    }
                    if event.is_update() && !event.has_snapshot() {
                        tally.snapshots_missing += 1;
                    }
                    let verdict = self.check_event(&event).await;
                    match &verdict {
                        // Update-lookup was requested, so a missing snapshot is
                        // itself a store defect even when the read agrees
                        Verdict::Consistent => warn!(
                            target: "feedcheck::consumer",
                            key = %event.key,
                            event = ?event,
                            "Found update without fullDocument"
                        ),
                        Verdict::Inconsistent {
                            field,
                            expected,
                            found,
                        } => error!(
                            target: "feedcheck::consumer",
                            key = %event.key,
                            field = %field,
                            expected = %expected,
                            found = ?found,
                            event = ?event,
                            "Found update without fullDocument that disagrees with the store"
                        ),
                        Verdict::NotChecked | Verdict::Skipped(_) => {}
                    }
                    tally.record(&verdict);
                }
                FeedPoll::Idle => {
                    tally.idle_polls += 1;
                    completion.check()?;
                    if completion.has_completed() {
                        debug!(target: "feedcheck::consumer", "Generator done, waiting for sentinel on the feed");
                    }
                }
                FeedPoll::Closed => {
                    return Err(Error::Feed(
                        "change feed closed before the sentinel arrived".to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;
    use feedcheck_core::{DocId, Namespace, UpdateDescription, UpdateSpec, WriteOp};
    use feedcheck_store::{Fault, FeedOptions, MemoryStore};

    use crate::generator::GeneratorReport;
    use crate::task::GeneratorOutcome;

    async fn store_with(id: i64, fields: bson::Document) -> MemoryStore {
        let store = MemoryStore::new(Namespace::new("test", "consumer"));
        let mut document = doc! { "_id": id };
        document.extend(fields);
        store
            .bulk_write(&[WriteOp::ReplaceUpsert {
                id: DocId(id),
                document,
            }])
            .await
            .unwrap();
        store
    }

    fn bare_update(id: i64, fields: bson::Document) -> ChangeEvent {
        ChangeEvent::update(
            DocKey::Id(DocId(id)),
            UpdateDescription {
                updated_fields: fields,
                removed_fields: vec![],
            },
            None,
        )
    }

    fn sentinel() -> DocKey {
        DocKey::Object(ObjectId::new())
    }

    #[tokio::test]
    async fn test_check_consistent() {
        let store = store_with(1, doc! { "u": 1_i64, "u5": 1_i64 }).await;
        let consumer = FeedConsumer::new(&store, sentinel());
        let verdict = consumer.check_event(&bare_update(1, doc! { "u5": 1_i64 })).await;
        assert_eq!(verdict, Verdict::Consistent);
    }

    #[tokio::test]
    async fn test_check_missing_field_is_inconsistent() {
        let store = store_with(1, doc! { "u": 1_i64 }).await;
        let consumer = FeedConsumer::new(&store, sentinel());
        let verdict = consumer.check_event(&bare_update(1, doc! { "u5": 1_i64 })).await;
        assert_eq!(
            verdict,
            Verdict::Inconsistent {
                field: "u5".to_string(),
                expected: Marker(1),
                found: None,
            }
        );
    }

    #[tokio::test]
    async fn test_check_mismatch_is_inconsistent() {
        let store = store_with(1, doc! { "u": 1_i64, "u5": 2_i64 }).await;
        let consumer = FeedConsumer::new(&store, sentinel());
        let verdict = consumer.check_event(&bare_update(1, doc! { "u5": 1_i64 })).await;
        assert!(matches!(
            verdict,
            Verdict::Inconsistent {
                found: Some(Marker(2)),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_check_benign_skips() {
        let store = store_with(1, doc! { "u": 1_i64 }).await;
        let consumer = FeedConsumer::new(&store, sentinel());

        let gone = consumer.check_event(&bare_update(2, doc! { "u5": 1_i64 })).await;
        assert_eq!(gone, Verdict::Skipped(SkipReason::DocumentGone));

        let no_tag = consumer.check_event(&bare_update(1, doc! { "k": 3_i64 })).await;
        assert_eq!(no_tag, Verdict::Skipped(SkipReason::NoTag));
    }

    #[tokio::test]
    async fn test_events_with_snapshot_are_not_checked() {
        let store = store_with(1, doc! { "u": 1_i64 }).await;
        let consumer = FeedConsumer::new(&store, sentinel());
        let mut event = bare_update(1, doc! { "u5": 1_i64 });
        event.full_document = Some(doc! { "_id": 1_i64 });
        assert_eq!(consumer.check_event(&event).await, Verdict::NotChecked);

        let insert = ChangeEvent::insert(DocKey::Id(DocId(1)), doc! { "_id": 1_i64 });
        assert_eq!(consumer.check_event(&insert).await, Verdict::NotChecked);
    }

    fn completed(sentinel: Result<()>) -> Completion {
        Completion {
            outcome: GeneratorOutcome::Completed(GeneratorReport::default()),
            finished_at: std::time::Instant::now(),
            sentinel,
        }
    }

    #[tokio::test]
    async fn test_drain_stops_at_sentinel() {
        let store = MemoryStore::new(Namespace::new("test", "drain"));
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();
        let oid = ObjectId::new();

        store
            .bulk_write(&[WriteOp::ReplaceUpsert {
                id: DocId(1),
                document: doc! { "_id": 1_i64, "u": 1_i64 },
            }])
            .await
            .unwrap();
        store.insert_one(doc! { "_id": oid }).await.unwrap();
        // Written after the sentinel: must not be consumed by this pass
        store
            .bulk_write(&[WriteOp::Update {
                id: DocId(1),
                change: UpdateSpec {
                    set: doc! { "u1": 1_i64 },
                    unset: vec![],
                },
            }])
            .await
            .unwrap();

        let (tx, rx) = oneshot::channel();
        tx.send(completed(Ok(()))).unwrap();
        let mut watch = CompletionWatch::new(rx);
        let consumer = FeedConsumer::new(&store, DocKey::Object(oid));
        let tally = consumer.drain(feed.as_mut(), &mut watch).await.unwrap();

        assert_eq!(tally.events, 2);
        assert_eq!(tally.inconsistencies, 0);
        assert!(matches!(feed.poll_next().await.unwrap(), FeedPoll::Event(_)));
    }

    #[tokio::test]
    async fn test_drain_reports_missing_snapshot_even_when_read_agrees() {
        let store = MemoryStore::new(Namespace::new("test", "missing_snapshot"));
        store.inject(Fault::DropSnapshot {
            tag: "u5".to_string(),
        });
        store
            .bulk_write(&[WriteOp::ReplaceUpsert {
                id: DocId(1),
                document: doc! { "_id": 1_i64, "u": 1_i64 },
            }])
            .await
            .unwrap();
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();
        let oid = ObjectId::new();

        store
            .bulk_write(&[WriteOp::Update {
                id: DocId(1),
                change: UpdateSpec {
                    set: doc! { "u5": 1_i64 },
                    unset: vec![],
                },
            }])
            .await
            .unwrap();
        store.insert_one(doc! { "_id": oid }).await.unwrap();

        let (_tx, rx) = oneshot::channel::<Completion>();
        let mut watch = CompletionWatch::new(rx);
        let consumer = FeedConsumer::new(&store, DocKey::Object(oid));
        let tally = consumer.drain(feed.as_mut(), &mut watch).await.unwrap();

        assert_eq!(tally.snapshots_missing, 1);
        assert_eq!(tally.updates_checked, 1);
        assert_eq!(tally.inconsistencies, 0);
    }

    #[tokio::test]
    async fn test_drain_fails_when_sentinel_write_failed() {
        let store = MemoryStore::new(Namespace::new("test", "lost"));
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();

        let (tx, rx) = oneshot::channel();
        tx.send(completed(Err(Error::SentinelWrite("rejected".into()))))
            .unwrap();
        let mut watch = CompletionWatch::new(rx);
        let consumer = FeedConsumer::new(&store, sentinel());

        let err = consumer.drain(feed.as_mut(), &mut watch).await.unwrap_err();
        assert!(matches!(err, Error::SentinelWrite(_)));
    }

    #[tokio::test]
    async fn test_drain_fails_when_generator_vanishes() {
        let store = MemoryStore::new(Namespace::new("test", "vanished"));
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();

        let (tx, rx) = oneshot::channel::<Completion>();
        drop(tx);
        let mut watch = CompletionWatch::new(rx);
        let consumer = FeedConsumer::new(&store, sentinel());

        let err = consumer.drain(feed.as_mut(), &mut watch).await.unwrap_err();
        assert!(matches!(err, Error::GeneratorLost));
    }

    #[tokio::test]
    async fn test_drain_fails_when_feed_closes() {
        let store = MemoryStore::new(Namespace::new("test", "closed"));
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();
        store.drop_collection().await.unwrap();

        let (_tx, rx) = oneshot::channel::<Completion>();
        let mut watch = CompletionWatch::new(rx);
        let consumer = FeedConsumer::new(&store, sentinel());

        let err = consumer.drain(feed.as_mut(), &mut watch).await.unwrap_err();
        assert!(matches!(err, Error::Feed(_)));
    }
}
