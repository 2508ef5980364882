//! Shared helpers for the pass scenario suite.

#![allow(dead_code)]

use std::sync::Arc;

use feedcheck::{HarnessConfig, MemoryStore, Namespace, Orchestrator, ShapeStrategy, Sequences};

/// Fresh in-memory store
pub fn memory_store(collection: &str) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(Namespace::new("test", collection)))
}

/// Standard workload with a short idle window and reproducible shapes
pub fn standard_config() -> HarnessConfig {
    HarnessConfig {
        max_await_ms: 20,
        shapes: ShapeStrategy::Uniform { seed: Some(42) },
        ..HarnessConfig::default()
    }
}

/// Orchestrator with fresh sequences, already prepared
pub async fn orchestrator(store: &Arc<MemoryStore>, config: HarnessConfig) -> Orchestrator {
    let orchestrator = Orchestrator::with_sequences(store.clone(), config, Sequences::new())
        .expect("valid config");
    orchestrator.prepare().await.expect("prepare");
    orchestrator
}
