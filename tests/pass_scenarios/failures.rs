//! Failure handling: contained write errors and fatal ones.

use feedcheck::{Error, Fault, GeneratorOutcome, HarnessConfig};

use crate::test_utils::*;

#[tokio::test]
async fn test_failed_batch_still_ends_the_pass() {
    let store = memory_store("failed_batch");
    // Second generate batch: the update and remove phases never run
    store.inject(Fault::FailBatch { index: 1 });
    let mut orchestrator = orchestrator(&store, standard_config()).await;

    let report = orchestrator.run_pass().await.unwrap();
    assert!(matches!(
        report.generator,
        GeneratorOutcome::Failed(Error::WriteBatch { ops: 1000, .. })
    ));
    assert_eq!(report.tally.events, 1001);
    assert_eq!(report.inconsistencies(), 0);
    assert_eq!(orchestrator.totals().passes, 1);
}

#[tokio::test]
async fn test_next_pass_runs_after_failed_batch() {
    let store = memory_store("recovers");
    store.inject(Fault::FailBatch { index: 0 });
    let config = HarnessConfig {
        generate: 20,
        update: 5,
        remove: 2,
        ..standard_config()
    };
    let mut orchestrator = orchestrator(&store, config).await;

    let first = orchestrator.run_pass().await.unwrap();
    assert!(!first.generator.is_completed());
    let second = orchestrator.run_pass().await.unwrap();
    assert!(second.generator.is_completed());
    assert_eq!(orchestrator.totals().passes, 2);
}

#[tokio::test]
async fn test_rejected_sentinel_is_fatal() {
    let store = memory_store("no_sentinel");
    store.inject(Fault::RejectInserts);
    let mut orchestrator = orchestrator(&store, standard_config()).await;

    let err = orchestrator.run_pass().await.unwrap_err();
    assert!(matches!(err, Error::SentinelWrite(_)));
    assert!(err.is_fatal());
    assert_eq!(orchestrator.totals().passes, 0);
}

#[tokio::test]
async fn test_shard_failure_other_than_already_sharded_is_fatal() {
    let store = memory_store("admin");
    store.inject(Fault::AdminFailure { code: 11600 });
    let mut orchestrator = orchestrator(&store, standard_config()).await;

    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, Error::Admin { code: Some(11600), .. }));
}

#[tokio::test]
async fn test_feed_subscription_failure_is_fatal() {
    let store = memory_store("no_feed");
    store.inject(Fault::RejectWatch);
    let mut orchestrator = orchestrator(&store, standard_config()).await;

    let err = orchestrator.run_pass().await.unwrap_err();
    assert!(matches!(err, Error::Feed(_)));
    // Nothing is written without a subscription
    assert!(store.stats().batch_sizes.is_empty());
}
