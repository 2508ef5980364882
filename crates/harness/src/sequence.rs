//! Process-wide sequence allocators
//!
//! Marker values and tag-field names must never repeat for the life of the
//! process, across passes included. Both come from a [`SequenceAllocator`]
//! that is created once and handed to every pass's generator.
//!
//! Only one generator task runs at a time today, but allocation is an atomic
//! increment so uniqueness holds if more writers are added.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of strictly increasing values
pub trait SequenceAllocator: Send + Sync {
    /// Allocate the next value. Every call returns a value greater than all
    /// values returned before it.
    fn next(&self) -> u64;

    /// Last value handed out (0 if none)
    fn current(&self) -> u64;
}

/// Lock-free counter
#[derive(Debug, Default)]
pub struct AtomicSequence {
    /// Last allocated value
    value: AtomicU64,
}

impl AtomicSequence {
    /// Counter whose first allocation is 1
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Counter whose first allocation is `last + 1`
    pub fn starting_after(last: u64) -> Self {
        Self {
            value: AtomicU64::new(last),
        }
    }
}

impl SequenceAllocator for AtomicSequence {
    fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// The two sequences a generator draws from
#[derive(Clone)]
pub struct Sequences {
    /// Marker values
    pub markers: Arc<dyn SequenceAllocator>,
    /// Tag-field suffixes
    pub tags: Arc<dyn SequenceAllocator>,
}

impl Sequences {
    /// Fresh counters starting at 1
    pub fn new() -> Self {
        Self {
            markers: Arc::new(AtomicSequence::new()),
            tags: Arc::new(AtomicSequence::new()),
        }
    }
}

impl Default for Sequences {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Sequences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequences")
            .field("markers", &self.markers.current())
            .field("tags", &self.tags.current())
            .finish()
    }
}
