//! Pass Scenario Test Suite
//!
//! Full passes driven end to end against the in-memory store.
//!
//! ## Modules
//!
//! - **scenarios**: clean runs, injected stale reads, empty passes
//! - **invariants**: marker and tag uniqueness, round trips, sharding setup
//! - **failures**: write-batch failures, lost sentinels, fatal errors
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test pass_scenarios
//! ```

mod test_utils;

mod failures;
mod invariants;
mod scenarios;
