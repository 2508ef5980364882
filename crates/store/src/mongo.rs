//! MongoDB binding for the store traits
//!
//! Batches are sent as raw `update` / `delete` write commands instead of the
//! driver's client-level bulk write, which needs a newer server than the
//! clusters this harness usually targets. Consecutive operations that map to
//! the same command share one round trip; order is preserved.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};
use mongodb::change_stream::ChangeStream;
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, FullDocumentType};
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use feedcheck_core::{
    ChangeEvent, DocKey, Error, Namespace, OperationKind, Result, UpdateDescription, WriteKind,
    WriteOp,
};

use crate::traits::{ChangeFeed, FeedOptions, FeedPoll, FullDocumentMode, Store};

/// Database used when the connection string names none
pub const DEFAULT_DATABASE: &str = "test";

/// Store backed by a MongoDB deployment
pub struct MongoStore {
    client: Client,
    database: Database,
    collection: Collection<Document>,
    namespace: Namespace,
}

impl MongoStore {
    /// Connect to `uri` and target `collection` in the URI's default database.
    ///
    /// Pings the deployment so that connection and authentication failures
    /// surface here rather than on the first write.
    pub async fn connect(uri: &str, collection: &str) -> Result<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        let database_name = options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let client = Client::with_options(options).map_err(|e| Error::Connection(e.to_string()))?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let database = client.database(&database_name);
        let namespace = Namespace::new(database_name, collection);
        info!(target: "feedcheck::store", namespace = %namespace, "Connected");

        Ok(Self {
            collection: database.collection(collection),
            database,
            client,
            namespace,
        })
    }

    /// Close all pooled connections.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }

    async fn run_admin(&self, command_name: &str, command: Document) -> Result<()> {
        self.client
            .database("admin")
            .run_command(command)
            .await
            .map(|_| ())
            .map_err(|e| admin_error(command_name, e))
    }

    async fn write_command(&self, deletes: bool, ops: &[WriteOp], batch_len: usize) -> Result<()> {
        let statements: Vec<Document> = ops.iter().map(WriteOp::to_statement).collect();
        let command = if deletes {
            doc! {
                "delete": self.namespace.collection.as_str(),
                "deletes": statements,
                "ordered": true,
            }
        } else {
            doc! {
                "update": self.namespace.collection.as_str(),
                "updates": statements,
                "ordered": true,
            }
        };

        let reply = self
            .database
            .run_command(command)
            .await
            .map_err(|e| Error::WriteBatch {
                ops: batch_len,
                message: e.to_string(),
            })?;
        check_write_reply(&reply, batch_len)
    }
}

#[async_trait]
impl Store for MongoStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn drop_collection(&self) -> Result<()> {
        self.collection
            .drop()
            .await
            .map_err(|e| admin_error("drop", e))
    }

    async fn enable_sharding(&self) -> Result<()> {
        self.run_admin(
            "enableSharding",
            doc! { "enableSharding": self.namespace.database.as_str() },
        )
        .await
    }

    async fn shard_collection(&self, key: &Document) -> Result<()> {
        self.run_admin(
            "shardCollection",
            doc! {
                "shardCollection": self.namespace.to_string(),
                "key": key.clone(),
            },
        )
        .await
    }

    async fn bulk_write(&self, batch: &[WriteOp]) -> Result<()> {
        for (deletes, ops) in command_groups(batch) {
            self.write_command(deletes, ops, batch.len()).await?;
        }
        Ok(())
    }

    async fn watch(&self, options: &FeedOptions) -> Result<Box<dyn ChangeFeed>> {
        let mut watch = self
            .collection
            .watch()
            .batch_size(options.batch_size)
            .max_await_time(options.max_await);
        if options.full_document == FullDocumentMode::UpdateLookup {
            watch = watch.full_document(FullDocumentType::UpdateLookup);
        }
        let stream = watch.await.map_err(|e| Error::Feed(e.to_string()))?;
        Ok(Box::new(MongoFeed { stream }))
    }

    async fn find_one(&self, key: &DocKey) -> Result<Option<Document>> {
        self.collection
            .find_one(key.filter())
            .await
            .map_err(|e| Error::Read(e.to_string()))
    }

    async fn insert_one(&self, document: Document) -> Result<()> {
        self.collection
            .insert_one(document)
            .await
            .map(|_| ())
            .map_err(|e| Error::WriteBatch {
                ops: 1,
                message: e.to_string(),
            })
    }
}

/// Change stream on a MongoDB collection
pub struct MongoFeed {
    stream: ChangeStream<ChangeStreamEvent<Document>>,
}

#[async_trait]
impl ChangeFeed for MongoFeed {
    async fn poll_next(&mut self) -> Result<FeedPoll> {
        loop {
            if !self.stream.is_alive() {
                return Ok(FeedPoll::Closed);
            }
            let next = self
                .stream
                .next_if_any()
                .await
                .map_err(|e| Error::Feed(e.to_string()))?;
            match next {
                Some(raw) => match convert_event(raw) {
                    Some(event) => return Ok(FeedPoll::Event(event)),
                    // Collection-level events (drop, invalidate) carry no document key
                    None => continue,
                },
                None if self.stream.is_alive() => return Ok(FeedPoll::Idle),
                None => return Ok(FeedPoll::Closed),
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Dropping the stream kills the server-side cursor
        drop(self);
        Ok(())
    }
}

fn convert_event(raw: ChangeStreamEvent<Document>) -> Option<ChangeEvent> {
    let key = raw.document_key.as_ref().and_then(DocKey::from_document);
    let Some(key) = key else {
        debug!(
            target: "feedcheck::store",
            operation = ?raw.operation_type,
            "Skipping event without a recognised document key"
        );
        return None;
    };

    let operation = match raw.operation_type {
        OperationType::Insert => OperationKind::Insert,
        OperationType::Update => OperationKind::Update,
        OperationType::Replace => OperationKind::Replace,
        OperationType::Delete => OperationKind::Delete,
        other => OperationKind::Other(format!("{:?}", other)),
    };

    Some(ChangeEvent {
        operation,
        key,
        full_document: raw.full_document,
        update: raw.update_description.map(|d| UpdateDescription {
            updated_fields: d.updated_fields,
            removed_fields: d.removed_fields,
        }),
    })
}

/// Split a batch into runs of operations that share a write command.
fn command_groups(batch: &[WriteOp]) -> Vec<(bool, &[WriteOp])> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=batch.len() {
        let boundary = i == batch.len()
            || (batch[i].kind() == WriteKind::Delete) != (batch[start].kind() == WriteKind::Delete);
        if boundary {
            groups.push((batch[start].kind() == WriteKind::Delete, &batch[start..i]));
            start = i;
        }
    }
    groups
}

/// Surface per-statement failures that the server reports with `ok: 1`.
fn check_write_reply(reply: &Document, batch_len: usize) -> Result<()> {
    if let Ok(errors) = reply.get_array("writeErrors") {
        if let Some(first) = errors.first() {
            let message = match first {
                Bson::Document(detail) => detail
                    .get_str("errmsg")
                    .map(str::to_string)
                    .unwrap_or_else(|_| detail.to_string()),
                other => other.to_string(),
            };
            return Err(Error::WriteBatch {
                ops: batch_len,
                message: format!("{} write error(s), first: {}", errors.len(), message),
            });
        }
    }
    if let Ok(concern) = reply.get_document("writeConcernError") {
        return Err(Error::WriteBatch {
            ops: batch_len,
            message: format!("write concern error: {}", concern),
        });
    }
    Ok(())
}

fn admin_error(command: &str, err: mongodb::error::Error) -> Error {
    let code = match err.kind.as_ref() {
        ErrorKind::Command(command_error) => Some(command_error.code),
        _ => None,
    };
    Error::admin(command, code, err.to_string())
}
