//! Property-based tests for patching, undo and merging.

mod common;

use common::*;
use orrery_cache::{MergeOptions, Record, RecordCache, RecordOperation, Store};
use proptest::prelude::*;
use test_case::test_case;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    // Applying the returned inverse restores records and index exactly.
    #[test]
    fn inverse_restores_cache(setup in operations(12), ops in operations(8)) {
        let mut cache = RecordCache::new(schema());
        cache.patch(&setup).unwrap();
        let records_before = records(&cache);
        let index_before = cache.snapshot().state().all_inverse_relationships();

        let inverse = cache.patch(&ops).unwrap();
        cache.patch(&inverse).unwrap();

        prop_assert_eq!(records(&cache), records_before);
        prop_assert_eq!(cache.snapshot().state().all_inverse_relationships(), index_before);
    }

    #[test]
    fn patches_keep_cache_consistent(batches in prop::collection::vec(operations(6), 1..5)) {
        let mut cache = RecordCache::new(schema());
        for batch in &batches {
            cache.patch(batch).unwrap();
            check_invariants(&cache);
        }
    }

    // Removing a record (and whatever cascades from it) leaves nothing
    // pointing at it, whether or not the relationship has an inverse.
    #[test]
    fn removal_leaves_no_references(setup in operations(12), target in any_id()) {
        let mut cache = RecordCache::new(schema());
        cache.patch(&setup).unwrap();
        prop_assume!(cache.get_record(&target).is_some());
        let before: Vec<_> = cache.all_records().into_iter().map(|r| r.identity.clone()).collect();

        cache.patch(&[RecordOperation::remove_record(target.clone())]).unwrap();

        let removed: Vec<_> = before
            .into_iter()
            .filter(|id| cache.get_record(id).is_none())
            .collect();
        prop_assert!(removed.contains(&target));
        for record in cache.all_records() {
            for (relationship, related) in record.relationship_members() {
                prop_assert!(
                    !removed.contains(related),
                    "{} still references {} via {}", record.identity, related, relationship
                );
            }
        }
        check_invariants(&cache);
    }

    // One patch of many operations is the same as one patch per operation.
    #[test]
    fn patch_is_sequential(ops in operations(10)) {
        let mut batched = RecordCache::new(schema());
        batched.patch(&ops).unwrap();

        let mut stepped = RecordCache::new(schema());
        for op in &ops {
            stepped.patch(std::slice::from_ref(op)).unwrap();
        }
        prop_assert_eq!(records(&batched), records(&stepped));
    }

    #[test]
    fn fork_is_isolated(setup in operations(10), ops in operations(8)) {
        let mut cache = RecordCache::new(schema());
        cache.patch(&setup).unwrap();
        let snapshot = cache.snapshot();
        let before = records(&cache);

        let mut fork = cache.fork();
        fork.patch(&ops).unwrap();

        prop_assert_eq!(records(&cache), before.clone());
        let from_snapshot: Vec<_> = snapshot.all_records().into_iter().cloned().collect();
        prop_assert_eq!(from_snapshot, before);
    }

    #[test]
    fn coalesced_merge_matches_plain_merge(
        setup in operations(10),
        transforms in prop::collection::vec(operations(4), 1..5),
    ) {
        let mut base = Store::new(schema());
        base.update(setup).unwrap();
        let mut fork = base.fork();
        for ops in transforms {
            fork.update(ops).unwrap();
        }

        let mut plain = base.fork();
        let mut coalesced = base.fork();
        let plain_id = plain.merge(&fork, MergeOptions::default()).unwrap();
        let coalesced_id = coalesced.merge(&fork, MergeOptions::coalesced()).unwrap();

        prop_assert_eq!(records(plain.cache()), records(fork.cache()));
        prop_assert_eq!(records(coalesced.cache()), records(fork.cache()));
        prop_assert!(
            coalesced.get_transform(&coalesced_id).unwrap().operations.len()
                <= plain.get_transform(&plain_id).unwrap().operations.len()
        );
    }

    #[test]
    fn rollback_restores_every_step(batches in prop::collection::vec(operations(5), 1..6)) {
        let mut store = Store::new(schema());
        let mut checkpoints = Vec::new();
        for batch in batches {
            let id = store.update(batch).unwrap();
            checkpoints.push((id, records(store.cache())));
        }

        while let Some((id, expected)) = checkpoints.pop() {
            store.rollback(&id, 0).unwrap();
            prop_assert_eq!(records(store.cache()), expected);
            prop_assert!(store.transforms_since(&id).unwrap().is_empty());
            store.rollback(&id, -1).unwrap();
        }
        prop_assert_eq!(store.cache().record_count(), 0);
        prop_assert!(store.log().is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn inverse_restores_missions(setup in mission_operations(12), ops in mission_operations(8)) {
        let mut cache = RecordCache::new(missions());
        cache.patch(&setup).unwrap();
        let records_before = records(&cache);
        let index_before = cache.snapshot().state().all_inverse_relationships();

        let inverse = cache.patch(&ops).unwrap();
        check_invariants(&cache);
        cache.patch(&inverse).unwrap();

        prop_assert_eq!(records(&cache), records_before);
        prop_assert_eq!(cache.snapshot().state().all_inverse_relationships(), index_before);
        check_invariants(&cache);
    }

    #[test]
    fn missions_stay_consistent(batches in prop::collection::vec(mission_operations(6), 1..5)) {
        let mut cache = RecordCache::new(missions());
        for batch in &batches {
            cache.patch(batch).unwrap();
            check_invariants(&cache);
        }
    }
}

fn undo_round_trip(op: RecordOperation) {
    let mut cache = RecordCache::new(schema());
    cache
        .patch(&[
            RecordOperation::add_record(
                Record::new("planet", "earth")
                    .with_attribute("name", "Earth")
                    .with_key("remoteId", "p3")
                    .with_has_many("moons", [moon("luna")])
                    .with_has_one("star", Some(star("sun"))),
            ),
            RecordOperation::add_record(Record::new("star", "sun")),
            RecordOperation::add_record(
                Record::new("planet", "mercury").with_has_one("star", Some(star("sirius"))),
            ),
            RecordOperation::add_record(Record::new("planet", "mars").with_has_many(
                "moons",
                [moon("phobos"), moon("deimos")],
            )),
        ])
        .unwrap();
    let before = records(&cache);

    let inverse = cache.patch(&[op]).unwrap();
    check_invariants(&cache);
    cache.patch(&inverse).unwrap();

    assert_eq!(records(&cache), before);
    check_invariants(&cache);
}

#[test_case(RecordOperation::add_record(Record::new("moon", "io").with_has_one("planet", Some(planet("earth")))) ; "add steals nothing")]
#[test_case(RecordOperation::update_record(Record::new("planet", "earth").with_has_many("moons", [moon("phobos")])) ; "update steals a moon")]
#[test_case(RecordOperation::remove_record(planet("mars")) ; "remove cascades to moons")]
#[test_case(RecordOperation::remove_record(star("sun")) ; "remove detaches holders")]
#[test_case(RecordOperation::replace_key(planet("earth"), "remoteId", None) ; "clear key")]
#[test_case(RecordOperation::replace_attribute(planet("venus"), "name", "Venus") ; "attribute creates stub")]
#[test_case(RecordOperation::add_to_related_records(planet("earth"), "moons", moon("deimos")) ; "add moves moon")]
#[test_case(RecordOperation::remove_from_related_records(planet("mars"), "moons", moon("phobos")) ; "remove from set")]
#[test_case(RecordOperation::replace_related_records(planet("mars"), "moons", [moon("luna")]) ; "replace set")]
#[test_case(RecordOperation::replace_related_record(moon("luna"), "planet", Some(planet("jupiter"))) ; "link creates owner")]
#[test_case(RecordOperation::update_record(Record::new("star", "sirius")) ; "creation keeps dangling holder")]
fn test_undo_round_trip(op: RecordOperation) {
    undo_round_trip(op);
}
