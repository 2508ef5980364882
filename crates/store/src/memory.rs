//! MemoryStore: in-process store with a live change feed
//!
//! Stands in for a real deployment in tests. Writes are applied under one
//! `parking_lot::Mutex` and their events are published while the lock is
//! held, so every feed sees events in exactly the order the writes were
//! applied.
//!
//! # Fault injection
//!
//! [`Fault`] values reproduce store misbehaviour on demand: update events
//! without snapshots, stale point reads, rejected batches, a rejected
//! sentinel insert, failing admin commands or a failing subscription.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use feedcheck_core::fields::ID_FIELD;
use feedcheck_core::{
    ChangeEvent, DocKey, Error, Namespace, OperationKind, Result, UpdateDescription, UpdateSpec,
    WriteOp, ALREADY_INITIALIZED,
};

use crate::traits::{ChangeFeed, FeedOptions, FeedPoll, FullDocumentMode, Store};

/// Server code for "sharding not enabled for database"
pub const SHARDING_NOT_ENABLED: i32 = 20;

/// Misbehaviour a [`MemoryStore`] can be told to exhibit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Update events that set `tag` carry no snapshot, and point reads hide `tag`.
    StaleLookup {
        /// Tag field name
        tag: String,
    },
    /// Update events that set `tag` carry no snapshot; reads are unaffected.
    DropSnapshot {
        /// Tag field name
        tag: String,
    },
    /// The bulk write with this zero-based index (counted per store) is rejected.
    FailBatch {
        /// Index of the batch to reject
        index: usize,
    },
    /// `insert_one` is rejected.
    RejectInserts,
    /// `shard_collection` fails with this server code.
    AdminFailure {
        /// Server error code
        code: i32,
    },
    /// `watch` fails.
    RejectWatch,
}

/// Counters describing what a [`MemoryStore`] has been asked to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Size of every bulk write, in call order (rejected ones included)
    pub batch_sizes: Vec<usize>,
    /// Successful `insert_one` calls
    pub inserts: usize,
    /// `drop_collection` calls
    pub drops: usize,
    /// `watch` calls
    pub watches: usize,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<DocKey, Document>,
    subscribers: Vec<Subscriber>,
    sharding_enabled: bool,
    sharded: bool,
    faults: Vec<Fault>,
    stats: MemoryStats,
}

struct Subscriber {
    sender: mpsc::UnboundedSender<ChangeEvent>,
    full_document: FullDocumentMode,
}

impl MemoryState {
    fn publish(&mut self, event: ChangeEvent) {
        let snapshot_suppressed = event.is_update() && self.suppresses_snapshot(&event);
        self.subscribers.retain(|subscriber| {
            let mut delivered = event.clone();
            if delivered.is_update()
                && (snapshot_suppressed || subscriber.full_document == FullDocumentMode::Default)
            {
                delivered.full_document = None;
            }
            subscriber.sender.send(delivered).is_ok()
        });
    }

    fn suppresses_snapshot(&self, event: &ChangeEvent) -> bool {
        let Some(update) = event.update.as_ref() else {
            return false;
        };
        self.faults.iter().any(|fault| match fault {
            Fault::StaleLookup { tag } | Fault::DropSnapshot { tag } => {
                update.updated_fields.contains_key(tag)
            }
            _ => false,
        })
    }

    fn hidden_fields(&self) -> Vec<&str> {
        self.faults
            .iter()
            .filter_map(|fault| match fault {
                Fault::StaleLookup { tag } => Some(tag.as_str()),
                _ => None,
            })
            .collect()
    }

    fn has_fault(&self, wanted: &Fault) -> bool {
        self.faults.iter().any(|fault| fault == wanted)
    }

    fn apply(&mut self, op: &WriteOp) {
        let key = DocKey::Id(op.id());
        match op {
            WriteOp::ReplaceUpsert { document, .. } => {
                let mut document = document.clone();
                document.insert(ID_FIELD, key.to_bson());
                let existed = self.documents.insert(key, document.clone()).is_some();
                let event = if existed {
                    ChangeEvent {
                        operation: OperationKind::Replace,
                        key,
                        full_document: Some(document),
                        update: None,
                    }
                } else {
                    ChangeEvent::insert(key, document)
                };
                self.publish(event);
            }
            WriteOp::Update { change, .. } => {
                let Some(current) = self.documents.get_mut(&key) else {
                    // upsert is off: updating a missing document is a no-op
                    return;
                };
                let description = apply_update(current, change);
                let snapshot = current.clone();
                self.publish(ChangeEvent::update(key, description, Some(snapshot)));
            }
            WriteOp::Delete { .. } => {
                if self.documents.remove(&key).is_some() {
                    self.publish(ChangeEvent::delete(key));
                }
            }
        }
    }
}

fn apply_update(document: &mut Document, change: &UpdateSpec) -> UpdateDescription {
    for (field, value) in change.set.iter() {
        document.insert(field.clone(), value.clone());
    }
    let removed_fields = change
        .unset
        .iter()
        .filter(|field| document.remove(field.as_str()).is_some())
        .cloned()
        .collect();
    UpdateDescription {
        updated_fields: change.set.clone(),
        removed_fields,
    }
}

/// In-memory document store
pub struct MemoryStore {
    namespace: Namespace,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store for `namespace`
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Add a fault; it stays active until [`MemoryStore::clear_faults`].
    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push(fault);
    }

    /// Remove every active fault
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Current version of a document, bypassing any injected read faults
    pub fn document(&self, key: &DocKey) -> Option<Document> {
        self.state.lock().documents.get(key).cloned()
    }

    /// Number of documents currently stored
    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    /// True if the collection holds no documents
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once `shard_collection` has succeeded since the last drop
    pub fn is_sharded(&self) -> bool {
        self.state.lock().sharded
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> MemoryStats {
        self.state.lock().stats.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn drop_collection(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.documents.clear();
        state.sharded = false;
        // Dropping a collection invalidates its change streams
        state.subscribers.clear();
        state.stats.drops += 1;
        Ok(())
    }

    async fn enable_sharding(&self) -> Result<()> {
        self.state.lock().sharding_enabled = true;
        Ok(())
    }

    async fn shard_collection(&self, _key: &Document) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(code) = state.faults.iter().find_map(|fault| match fault {
            Fault::AdminFailure { code } => Some(*code),
            _ => None,
        }) {
            return Err(Error::admin("shardCollection", Some(code), "injected failure"));
        }
        if !state.sharding_enabled {
            return Err(Error::admin(
                "shardCollection",
                Some(SHARDING_NOT_ENABLED),
                format!("sharding not enabled for db {}", self.namespace.database),
            ));
        }
        if state.sharded {
            return Err(Error::admin(
                "shardCollection",
                Some(ALREADY_INITIALIZED),
                format!("sharding already enabled for collection {}", self.namespace),
            ));
        }
        state.sharded = true;
        Ok(())
    }

    async fn bulk_write(&self, batch: &[WriteOp]) -> Result<()> {
        let mut state = self.state.lock();
        let index = state.stats.batch_sizes.len();
        state.stats.batch_sizes.push(batch.len());
        if state.has_fault(&Fault::FailBatch { index }) {
            return Err(Error::WriteBatch {
                ops: batch.len(),
                message: format!("injected failure for batch {}", index),
            });
        }
        for op in batch {
            state.apply(op);
        }
        trace!(target: "feedcheck::store", ops = batch.len(), "Applied batch");
        Ok(())
    }

    async fn watch(&self, options: &FeedOptions) -> Result<Box<dyn ChangeFeed>> {
        let mut state = self.state.lock();
        if state.has_fault(&Fault::RejectWatch) {
            return Err(Error::Feed("injected watch failure".to_string()));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber {
            sender,
            full_document: options.full_document,
        });
        state.stats.watches += 1;
        Ok(Box::new(MemoryFeed {
            receiver,
            max_await: options.max_await,
        }))
    }

    async fn find_one(&self, key: &DocKey) -> Result<Option<Document>> {
        let state = self.state.lock();
        let hidden = state.hidden_fields();
        Ok(state.documents.get(key).map(|document| {
            let mut document = document.clone();
            for field in hidden {
                document.remove(field);
            }
            document
        }))
    }

    async fn insert_one(&self, document: Document) -> Result<()> {
        let mut state = self.state.lock();
        if state.has_fault(&Fault::RejectInserts) {
            return Err(Error::WriteBatch {
                ops: 1,
                message: "injected insert failure".to_string(),
            });
        }
        let key = DocKey::from_document(&document).ok_or_else(|| Error::WriteBatch {
            ops: 1,
            message: "document has no usable _id".to_string(),
        })?;
        if state.documents.contains_key(&key) {
            return Err(Error::WriteBatch {
                ops: 1,
                message: format!("E11000 duplicate key: {}", key),
            });
        }
        state.documents.insert(key, document.clone());
        state.stats.inserts += 1;
        state.publish(ChangeEvent::insert(key, document));
        Ok(())
    }
}

/// Feed handed out by [`MemoryStore::watch`]
pub struct MemoryFeed {
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
    max_await: Duration,
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn poll_next(&mut self) -> Result<FeedPoll> {
        match tokio::time::timeout(self.max_await, self.receiver.recv()).await {
            Ok(Some(event)) => Ok(FeedPoll::Event(event)),
            Ok(None) => Ok(FeedPoll::Closed),
            Err(_) => Ok(FeedPoll::Idle),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut feed = self;
        feed.receiver.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use feedcheck_core::DocId;

    fn store() -> MemoryStore {
        MemoryStore::new(Namespace::new("test", "memory"))
    }

    fn replace(id: i64, marker: i64) -> WriteOp {
        WriteOp::ReplaceUpsert {
            id: DocId(id),
            document: doc! { "_id": id, "u": marker },
        }
    }

    fn tag_update(id: i64, tag: &str, marker: i64) -> WriteOp {
        WriteOp::Update {
            id: DocId(id),
            change: UpdateSpec {
                set: doc! { tag: marker },
                unset: vec!["k".to_string()],
            },
        }
    }

    async fn next_event(feed: &mut Box<dyn ChangeFeed>) -> ChangeEvent {
        match feed.poll_next().await.unwrap() {
            FeedPoll::Event(event) => event,
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replace_upsert_emits_insert_then_replace() {
        let store = store();
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();

        store.bulk_write(&[replace(1, 1), replace(1, 2)]).await.unwrap();

        assert_eq!(next_event(&mut feed).await.operation, OperationKind::Insert);
        let second = next_event(&mut feed).await;
        assert_eq!(second.operation, OperationKind::Replace);
        assert_eq!(second.full_document.unwrap().get_i64("u").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_event_carries_changed_fields_and_snapshot() {
        let store = store();
        store.bulk_write(&[replace(1, 1)]).await.unwrap();
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();

        store.bulk_write(&[tag_update(1, "u1", 1)]).await.unwrap();

        let event = next_event(&mut feed).await;
        assert!(event.is_update());
        assert!(event.has_snapshot());
        let update = event.update.unwrap();
        assert_eq!(update.updated_fields.get_i64("u1").unwrap(), 1);
        // "k" was never set, so nothing was removed
        assert!(update.removed_fields.is_empty());
    }

    #[tokio::test]
    async fn test_update_of_missing_document_is_silent() {
        let store = store();
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();
        store.bulk_write(&[tag_update(9, "u1", 1)]).await.unwrap();
        assert_eq!(feed.poll_next().await.unwrap(), FeedPoll::Idle);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_default_mode_omits_update_snapshots() {
        let store = store();
        store.bulk_write(&[replace(1, 1)]).await.unwrap();
        let options = FeedOptions {
            full_document: FullDocumentMode::Default,
            ..FeedOptions::default()
        };
        let mut feed = store.watch(&options).await.unwrap();
        store.bulk_write(&[tag_update(1, "u1", 1)]).await.unwrap();
        assert!(!next_event(&mut feed).await.has_snapshot());
    }

    #[tokio::test]
    async fn test_stale_lookup_fault() {
        let store = store();
        store.inject(Fault::StaleLookup {
            tag: "u1".to_string(),
        });
        store.bulk_write(&[replace(1, 1)]).await.unwrap();
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();
        store.bulk_write(&[tag_update(1, "u1", 1)]).await.unwrap();

        let event = next_event(&mut feed).await;
        assert!(!event.has_snapshot());

        let key = DocKey::Id(DocId(1));
        let read = store.find_one(&key).await.unwrap().unwrap();
        assert!(!read.contains_key("u1"));
        // The stored document itself is intact
        assert!(store.document(&key).unwrap().contains_key("u1"));
    }

    #[tokio::test]
    async fn test_fail_batch_fault_rejects_only_that_batch() {
        let store = store();
        store.inject(Fault::FailBatch { index: 1 });
        store.bulk_write(&[replace(1, 1)]).await.unwrap();
        let err = store.bulk_write(&[replace(2, 2)]).await.unwrap_err();
        assert!(matches!(err, Error::WriteBatch { ops: 1, .. }));
        store.bulk_write(&[replace(3, 3)]).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().batch_sizes, vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_shard_collection_lifecycle() {
        let store = store();
        let key = doc! { "_id": 1 };

        let err = store.shard_collection(&key).await.unwrap_err();
        assert!(!err.is_already_sharded());

        store.enable_sharding().await.unwrap();
        store.shard_collection(&key).await.unwrap();
        assert!(store.shard_collection(&key).await.unwrap_err().is_already_sharded());

        store.drop_collection().await.unwrap();
        assert!(!store.is_sharded());
        store.shard_collection(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_closes_feeds() {
        let store = store();
        let mut feed = store.watch(&FeedOptions::default()).await.unwrap();
        store.drop_collection().await.unwrap();
        assert_eq!(feed.poll_next().await.unwrap(), FeedPoll::Closed);
    }

    #[tokio::test]
    async fn test_insert_one_rejects_duplicates() {
        let store = store();
        let document = doc! { "_id": bson::oid::ObjectId::new() };
        store.insert_one(document.clone()).await.unwrap();
        assert!(store.insert_one(document).await.is_err());
        assert_eq!(store.stats().inserts, 1);
    }
}
