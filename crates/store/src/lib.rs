//! Store layer for feedcheck
//!
//! This crate defines the collaborator surface the harness needs from a
//! document store and two implementations of it:
//! - Store / ChangeFeed: async traits for admin commands, batched writes,
//!   point reads and change feeds
//! - MongoStore: binding to a MongoDB deployment via the official driver
//! - MemoryStore: in-process store with a live feed and fault injection

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod mongo;
pub mod traits;

pub use memory::{Fault, MemoryFeed, MemoryStats, MemoryStore};
pub use mongo::{MongoFeed, MongoStore, DEFAULT_DATABASE};
pub use traits::{ChangeFeed, FeedOptions, FeedPoll, FullDocumentMode, Store};
