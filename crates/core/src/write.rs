//! Write operations carried in a batch

use bson::{doc, Bson, Document};

use crate::types::{DocId, DocKey};

/// `$set` / `$unset` pair for an in-place update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    /// Fields to set
    pub set: Document,
    /// Fields to remove
    pub unset: Vec<String>,
}

impl UpdateSpec {
    /// Render as an update document, omitting empty operators.
    pub fn to_document(&self) -> Document {
        let mut update = Document::new();
        if !self.set.is_empty() {
            update.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            let unset: Document = self
                .unset
                .iter()
                .map(|field| (field.clone(), Bson::Int32(1)))
                .collect();
            update.insert("$unset", unset);
        }
        update
    }
}

/// One element of a write batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the whole document, inserting it when missing
    ReplaceUpsert {
        /// Target id
        id: DocId,
        /// Replacement document (includes `_id`)
        document: Document,
    },
    /// In-place update; never upserts
    Update {
        /// Target id
        id: DocId,
        /// Changes to apply
        change: UpdateSpec,
    },
    /// Remove the document
    Delete {
        /// Target id
        id: DocId,
    },
}

/// Discriminant of a [`WriteOp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    /// [`WriteOp::ReplaceUpsert`]
    Replace,
    /// [`WriteOp::Update`]
    Update,
    /// [`WriteOp::Delete`]
    Delete,
}

impl WriteOp {
    /// Target id
    pub fn id(&self) -> DocId {
        match self {
            WriteOp::ReplaceUpsert { id, .. } => *id,
            WriteOp::Update { id, .. } => *id,
            WriteOp::Delete { id } => *id,
        }
    }

    /// Operation kind
    pub fn kind(&self) -> WriteKind {
        match self {
            WriteOp::ReplaceUpsert { .. } => WriteKind::Replace,
            WriteOp::Update { .. } => WriteKind::Update,
            WriteOp::Delete { .. } => WriteKind::Delete,
        }
    }

    /// `{_id: id}` filter
    pub fn filter(&self) -> Document {
        DocKey::Id(self.id()).filter()
    }

    /// Statement for the server's `update` / `delete` write commands.
    pub fn to_statement(&self) -> Document {
        match self {
            WriteOp::ReplaceUpsert { document, .. } => doc! {
                "q": self.filter(),
                "u": document.clone(),
                "upsert": true,
            },
            WriteOp::Update { change, .. } => doc! {
                "q": self.filter(),
                "u": change.to_document(),
                "upsert": false,
            },
            WriteOp::Delete { .. } => doc! {
                "q": self.filter(),
                "limit": 1,
            },
        }
    }
}
