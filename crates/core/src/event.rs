//! Change events as delivered by a store's feed

use bson::Document;

use crate::fields::{int_value, is_tag_name};
use crate::types::{DocKey, Marker};

/// Kind of mutation an event reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Document created (including replace-upsert of a missing document)
    Insert,
    /// In-place update
    Update,
    /// Whole-document replacement
    Replace,
    /// Document removed
    Delete,
    /// Anything else the feed may carry (drop, invalidate, ...)
    Other(String),
}

/// Fields touched by an update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDescription {
    /// Fields set by the update, with their new values
    pub updated_fields: Document,
    /// Fields removed by the update
    pub removed_fields: Vec<String>,
}

/// Tag field carried by an update event and the marker it asserts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertedTag {
    /// Tag field name (`u<seq>`)
    pub field: String,
    /// Marker the update wrote into that field
    pub marker: Marker,
}

/// One notification from the change feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Mutation kind
    pub operation: OperationKind,
    /// Affected document
    pub key: DocKey,
    /// Inline post-mutation snapshot, when the store attached one
    pub full_document: Option<Document>,
    /// Changed fields, for updates
    pub update: Option<UpdateDescription>,
}

impl ChangeEvent {
    /// Insert event carrying the inserted document
    pub fn insert(key: DocKey, document: Document) -> Self {
        Self {
            operation: OperationKind::Insert,
            key,
            full_document: Some(document),
            update: None,
        }
    }

    /// Update event, optionally with an inline snapshot
    pub fn update(key: DocKey, update: UpdateDescription, full_document: Option<Document>) -> Self {
        Self {
            operation: OperationKind::Update,
            key,
            full_document,
            update: Some(update),
        }
    }

    /// Delete event
    pub fn delete(key: DocKey) -> Self {
        Self {
            operation: OperationKind::Delete,
            key,
            full_document: None,
            update: None,
        }
    }

    /// True for update events
    pub fn is_update(&self) -> bool {
        self.operation == OperationKind::Update
    }

    /// True when the store attached a post-mutation snapshot
    pub fn has_snapshot(&self) -> bool {
        self.full_document.is_some()
    }

    /// The tag field this event asserts, if any.
    ///
    /// Takes the first field in the update payload that follows the tag naming
    /// convention and holds an integer.
    pub fn asserted_tag(&self) -> Option<AssertedTag> {
        let update = self.update.as_ref()?;
        update
            .updated_fields
            .iter()
            .find(|(name, _)| is_tag_name(name))
            .and_then(|(name, value)| {
                int_value(value).map(|marker| AssertedTag {
                    field: name.clone(),
                    marker: Marker(marker),
                })
            })
    }
}
