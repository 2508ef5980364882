//! Core types for feedcheck
//!
//! - DocId: integer key of a generated document
//! - Marker: logical version asserted for a document
//! - DocKey: any `_id` the harness writes (generated ids and sentinels)
//! - Namespace: database + collection pair

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fields::ID_FIELD;

/// Integer key of a generated document, unique within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(pub i64);

impl DocId {
    /// Raw integer value
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DocId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical version of a document.
///
/// Markers come from a single process-wide sequence, so two documents never
/// share one and a later allocation is always greater than an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Marker(pub i64);

impl Marker {
    /// Raw integer value
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document key as reported by the store.
///
/// Generated documents use integer keys and sentinels use ObjectId keys, so
/// the two can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKey {
    /// Generated document
    Id(DocId),
    /// End-of-pass sentinel
    Object(ObjectId),
}

impl DocKey {
    /// Decode an `_id` value. Returns None for key types the harness never writes.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int64(v) => Some(DocKey::Id(DocId(*v))),
            Bson::Int32(v) => Some(DocKey::Id(DocId(i64::from(*v)))),
            Bson::ObjectId(oid) => Some(DocKey::Object(*oid)),
            _ => None,
        }
    }

    /// Decode the `_id` of a `documentKey` (or any document carrying `_id`).
    pub fn from_document(document: &Document) -> Option<Self> {
        document.get(ID_FIELD).and_then(Self::from_bson)
    }

    /// Encode as a BSON value
    pub fn to_bson(&self) -> Bson {
        match self {
            DocKey::Id(id) => Bson::Int64(id.0),
            DocKey::Object(oid) => Bson::ObjectId(*oid),
        }
    }

    /// `{_id: <key>}` filter
    pub fn filter(&self) -> Document {
        doc! { ID_FIELD: self.to_bson() }
    }

    /// The integer id, if this is a generated document
    pub fn doc_id(&self) -> Option<DocId> {
        match self {
            DocKey::Id(id) => Some(*id),
            DocKey::Object(_) => None,
        }
    }
}

impl From<DocId> for DocKey {
    fn from(id: DocId) -> Self {
        DocKey::Id(id)
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocKey::Id(id) => write!(f, "{}", id),
            DocKey::Object(oid) => write!(f, "ObjectId({})", oid.to_hex()),
        }
    }
}

/// Database + collection pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
}

impl Namespace {
    /// Create a new namespace
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}
