//! End-to-end passes: clean store, stale point reads, empty passes.

use std::time::Duration;

use feedcheck::{DocId, DocKey, Fault, GeneratorOutcome, HarnessConfig};

use crate::test_utils::*;

// ============================================================================
// Clean store
// ============================================================================

#[tokio::test]
async fn test_standard_pass_finds_nothing() {
    let store = memory_store("clean");
    let config = standard_config();
    let mut orchestrator = orchestrator(&store, config.clone()).await;

    let report = tokio::time::timeout(Duration::from_secs(30), orchestrator.run_pass())
        .await
        .expect("pass terminates")
        .unwrap();

    assert_eq!(report.inconsistencies(), 0);
    // The sentinel is read within about one idle poll of the generator ending
    let slack = Duration::from_millis(250);
    assert!(
        report.sentinel_lag <= Duration::from_millis(config.max_await_ms) + slack,
        "pass drained {:?} after the generator finished",
        report.sentinel_lag
    );
    match report.generator {
        GeneratorOutcome::Completed(generated) => {
            assert_eq!(generated.generate.emitted, 2000);
            assert_eq!(generated.update.emitted, 100);
            assert_eq!(generated.remove.emitted, 100);
        }
        other => panic!("generator did not complete: {:?}", other),
    }
    // 2000 inserts, 100 updates, 100 deletes, then the sentinel
    assert_eq!(report.tally.events, 2201);
    assert_eq!(store.stats().batch_sizes, vec![1000, 1000, 100, 100]);
}

#[tokio::test]
async fn test_standard_pass_with_every_snapshot_missing_is_consistent() {
    let store = memory_store("no_snapshots");
    for tag in 1..=100 {
        store.inject(Fault::DropSnapshot {
            tag: format!("u{}", tag),
        });
    }
    let mut orchestrator = orchestrator(&store, standard_config()).await;
    let report = orchestrator.run_pass().await.unwrap();

    assert_eq!(report.snapshots_missing(), 100);
    assert_eq!(report.tally.updates_checked + report.tally.benign_skips, 100);
    assert_eq!(report.tally.read_failures, 0);
    assert_eq!(report.inconsistencies(), 0);
    // Only ids 0, 70 and 140 are both updated and removed
    assert!(report.tally.benign_skips <= 15);
}

// ============================================================================
// Injected stale point read
// ============================================================================

#[tokio::test]
async fn test_stale_lookup_counts_exactly_one_inconsistency() {
    let store = memory_store("stale");
    // Second update of the pass targets id 10, which is never removed
    store.inject(Fault::StaleLookup {
        tag: "u2".to_string(),
    });
    let mut orchestrator = orchestrator(&store, standard_config()).await;
    let report = orchestrator.run_pass().await.unwrap();

    assert_eq!(report.tally.snapshots_missing, 1);
    assert_eq!(report.inconsistencies(), 1);
    assert_eq!(orchestrator.totals().inconsistencies, 1);
    assert!(store.document(&DocKey::Id(DocId(10))).is_some());
}

#[tokio::test]
async fn test_inconsistencies_accumulate_across_passes() {
    let store = memory_store("stale_twice");
    // Tags are never reused, so each pass has its own second update
    store.inject(Fault::StaleLookup {
        tag: "u2".to_string(),
    });
    store.inject(Fault::StaleLookup {
        tag: "u102".to_string(),
    });
    let mut orchestrator = orchestrator(&store, standard_config()).await;

    let first = orchestrator.run_pass().await.unwrap();
    let second = orchestrator.run_pass().await.unwrap();

    assert_eq!(first.inconsistencies(), 1);
    assert_eq!(second.inconsistencies(), 1);
    assert_eq!(orchestrator.totals().passes, 2);
    assert_eq!(orchestrator.totals().inconsistencies, 2);
}

// ============================================================================
// Boundaries
// ============================================================================

#[tokio::test]
async fn test_zero_count_pass_writes_only_the_sentinel() {
    let store = memory_store("empty");
    let config = HarnessConfig {
        generate: 0,
        update: 0,
        remove: 0,
        ..standard_config()
    };
    let mut orchestrator = orchestrator(&store, config).await;
    let report = orchestrator.run_pass().await.unwrap();

    assert_eq!(report.tally.events, 1);
    assert_eq!(report.inconsistencies(), 0);
    assert!(report.generator.is_completed());
    assert!(store.stats().batch_sizes.is_empty());
    assert_eq!(store.stats().inserts, 1);
}

#[tokio::test]
async fn test_run_stops_after_max_passes() {
    let store = memory_store("bounded");
    let config = HarnessConfig {
        generate: 30,
        update: 10,
        remove: 3,
        max_passes: Some(2),
        ..standard_config()
    };
    let mut orchestrator = orchestrator(&store, config).await;
    let totals = orchestrator.run().await.unwrap();

    assert_eq!(totals.passes, 2);
    assert_eq!(totals.inconsistencies, 0);
    assert_eq!(store.stats().drops, 2);
}
