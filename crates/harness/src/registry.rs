//! Marker registry: ground truth for what each document should contain
//!
//! Owned by the generator task for one pass and dropped with it. The consumer
//! never reads it; its checks are rebuilt from store payloads so that local
//! state cannot mask a store bug.

use std::collections::HashMap;
use std::sync::Arc;

use feedcheck_core::{DocId, Marker};

use crate::sequence::SequenceAllocator;

/// Result of [`MarkerRegistry::assign`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Id was already tracked; nothing was allocated
    Existing(Marker),
    /// Id is new; this marker was just allocated for it
    Fresh(Marker),
}

impl Assignment {
    /// The marker, whichever way it was obtained
    pub fn marker(&self) -> Marker {
        match self {
            Assignment::Existing(marker) | Assignment::Fresh(marker) => *marker,
        }
    }

    /// True if the marker was allocated by this call
    pub fn is_fresh(&self) -> bool {
        matches!(self, Assignment::Fresh(_))
    }
}

/// Document id -> current marker
pub struct MarkerRegistry {
    markers: HashMap<DocId, Marker>,
    allocator: Arc<dyn SequenceAllocator>,
}

impl MarkerRegistry {
    /// Empty registry drawing markers from `allocator`
    pub fn new(allocator: Arc<dyn SequenceAllocator>) -> Self {
        Self {
            markers: HashMap::new(),
            allocator,
        }
    }

    /// Return the tracked marker for `id`, or allocate and record a new one.
    ///
    /// # Panics
    ///
    /// Panics if the allocator hands out a value above `i64::MAX`, which a
    /// marker field cannot hold.
    pub fn assign(&mut self, id: DocId) -> Assignment {
        if let Some(marker) = self.markers.get(&id) {
            return Assignment::Existing(*marker);
        }
        let next = self.allocator.next();
        let marker = Marker(i64::try_from(next).expect("marker sequence exceeded i64::MAX"));
        self.markers.insert(id, marker);
        Assignment::Fresh(marker)
    }

    /// Current marker for `id`
    pub fn lookup(&self, id: DocId) -> Option<Marker> {
        self.markers.get(&id).copied()
    }

    /// Stop tracking `id`, returning its last marker
    pub fn remove(&mut self, id: DocId) -> Option<Marker> {
        self.markers.remove(&id)
    }

    /// Number of tracked ids
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// True if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Iterate over tracked ids and markers (arbitrary order)
    pub fn iter(&self) -> impl Iterator<Item = (DocId, Marker)> + '_ {
        self.markers.iter().map(|(id, marker)| (*id, *marker))
    }
}

impl std::fmt::Debug for MarkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerRegistry")
            .field("tracked", &self.markers.len())
            .finish()
    }
}
