//! Store and change feed abstractions
//!
//! The harness talks to the document store only through these two traits, so
//! the MongoDB binding and the in-memory store are interchangeable.
//!
//! Thread safety: `Store` methods may be called concurrently from the
//! generator task and the consumer loop (requires Send + Sync).

use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use feedcheck_core::{ChangeEvent, DocKey, Namespace, Result, WriteOp};

/// How the feed attaches post-mutation snapshots to events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullDocumentMode {
    /// Only what the store attaches by default (inserts and replaces)
    Default,
    /// Look up the current document for update events
    UpdateLookup,
}

/// Subscription parameters for [`Store::watch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    /// Snapshot mode for update events
    pub full_document: FullDocumentMode,
    /// Events per server batch
    pub batch_size: u32,
    /// Longest a single poll waits for new events
    pub max_await: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            full_document: FullDocumentMode::UpdateLookup,
            batch_size: 2,
            max_await: Duration::from_millis(100),
        }
    }
}

/// Result of one feed poll
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPoll {
    /// Next event in delivery order
    Event(ChangeEvent),
    /// Nothing arrived within the await window
    Idle,
    /// The subscription ended
    Closed,
}

/// A live, ordered subscription to a collection's mutations
#[async_trait]
pub trait ChangeFeed: Send {
    /// Wait up to the configured await window for the next event.
    ///
    /// # Errors
    ///
    /// Returns [`feedcheck_core::Error::Feed`] if the subscription failed.
    async fn poll_next(&mut self) -> Result<FeedPoll>;

    /// Release the subscription.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Document store collaborator surface
#[async_trait]
pub trait Store: Send + Sync {
    /// Database and collection this store targets
    fn namespace(&self) -> &Namespace;

    /// Drop the target collection (a missing collection is not an error).
    async fn drop_collection(&self) -> Result<()>;

    /// Enable sharding for the target database.
    async fn enable_sharding(&self) -> Result<()>;

    /// Shard the target collection on `key`.
    ///
    /// Reports "already sharded" as [`feedcheck_core::Error::Admin`] with code
    /// [`feedcheck_core::ALREADY_INITIALIZED`]; callers decide whether to tolerate it.
    async fn shard_collection(&self, key: &Document) -> Result<()>;

    /// Apply a batch of writes in order.
    ///
    /// # Errors
    ///
    /// Returns [`feedcheck_core::Error::WriteBatch`] if any write is rejected.
    /// Writes before the failing one may already be applied.
    async fn bulk_write(&self, batch: &[WriteOp]) -> Result<()>;

    /// Open a change feed on the target collection.
    async fn watch(&self, options: &FeedOptions) -> Result<Box<dyn ChangeFeed>>;

    /// Read the current version of a single document.
    async fn find_one(&self, key: &DocKey) -> Result<Option<Document>>;

    /// Insert a single document.
    async fn insert_one(&self, document: Document) -> Result<()>;
}
