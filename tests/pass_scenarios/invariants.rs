//! Process-wide uniqueness, round trips and sharding setup.

use std::collections::HashSet;

use feedcheck::fields::marker_field;
use feedcheck::{
    ensure_sharded, CyclingShapes, DocKey, HarnessConfig, MutationGenerator, MutationPlan,
    PhaseCounts, Sequences, Store,
};

use crate::test_utils::*;

// ============================================================================
// Sequences
// ============================================================================

#[tokio::test]
async fn test_markers_and_tags_never_repeat_across_passes() {
    let store = memory_store("sequences");
    let mut orchestrator = orchestrator(&store, standard_config()).await;
    orchestrator.run_pass().await.unwrap();
    orchestrator.run_pass().await.unwrap();
    orchestrator.run_pass().await.unwrap();

    let sequences = orchestrator.sequences();
    // Every generate allocates once per new id, every update once per tag
    assert_eq!(sequences.markers.current(), 3 * 2000);
    assert_eq!(sequences.tags.current(), 3 * 100);
}

#[tokio::test]
async fn test_generators_sharing_sequences_write_distinct_tags() {
    let store = memory_store("shared_sequences");
    let sequences = Sequences::new();
    let plan = MutationPlan::standard(PhaseCounts {
        generate: 200,
        update: 60,
        remove: 0,
    });

    let mut tags = HashSet::new();
    let mut markers = HashSet::new();
    for _ in 0..3 {
        store.drop_collection().await.unwrap();
        let mut generator = MutationGenerator::new(
            store.clone(),
            &sequences,
            Box::new(CyclingShapes::default()),
            1000,
        );
        generator.run(&plan).await.unwrap();
        for tag in generator.last_tags().values() {
            assert!(tags.insert(tag.field.clone()), "tag {} repeated", tag.field);
        }
        for (_, marker) in generator.registry().iter() {
            assert!(markers.insert(marker), "marker {} repeated", marker);
        }
    }
    assert_eq!(markers.len(), 600);
}

// ============================================================================
// Round trip
// ============================================================================

#[tokio::test]
async fn test_last_tag_round_trips_through_point_read() {
    let store = memory_store("round_trip");
    let mut generator = MutationGenerator::new(
        store.clone(),
        &Sequences::new(),
        HarnessConfig::default().shapes.selector(1),
        1000,
    );
    let report = generator
        .run(&MutationPlan::standard(PhaseCounts::default()))
        .await
        .unwrap();
    assert_eq!(report.tracked, 1900);

    // Ids 0, 70 and 140 were updated and then removed
    assert_eq!(generator.last_tags().len(), 18);
    for (id, tag) in generator.last_tags() {
        let document = store
            .find_one(&DocKey::Id(*id))
            .await
            .unwrap()
            .expect("updated document survives");
        assert_eq!(marker_field(&document, &tag.field), Some(tag.marker));
        assert_eq!(marker_field(&document, "u"), Some(tag.marker));
    }
}

// ============================================================================
// Sharding setup
// ============================================================================

#[tokio::test]
async fn test_sharding_setup_is_idempotent() {
    let store = memory_store("sharding");
    store.enable_sharding().await.unwrap();
    ensure_sharded(store.as_ref()).await.unwrap();
    ensure_sharded(store.as_ref()).await.unwrap();
    assert!(store.is_sharded());
}

#[tokio::test]
async fn test_every_pass_starts_from_an_empty_sharded_collection() {
    let store = memory_store("reset");
    let config = HarnessConfig {
        generate: 40,
        update: 10,
        remove: 40,
        ..standard_config()
    };
    let mut orchestrator = orchestrator(&store, config).await;

    // 40 created, 6 of them (multiples of 7) removed, plus the sentinel
    orchestrator.run_pass().await.unwrap();
    assert_eq!(store.len(), 35);
    orchestrator.run_pass().await.unwrap();
    assert_eq!(store.len(), 35);
    assert!(store.is_sharded());
}
