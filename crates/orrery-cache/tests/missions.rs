//! Scenario tests for declared inverses that do not cascade.

mod common;

use common::*;
use orrery_cache::{Record, RecordCache, RecordOperation};
use pretty_assertions::assert_eq;

fn planet_of(cache: &RecordCache, id: &str) -> Option<String> {
    cache
        .get_record(&moon(id))
        .and_then(|m| m.related_record("planet"))
        .map(|p| p.id.clone())
}

#[test]
fn test_removing_owner_clears_moon_link() {
    let mut cache = RecordCache::new(missions());
    cache
        .patch(&[
            RecordOperation::add_record(Record::new("planet", "jupiter")),
            RecordOperation::add_record(Record::new("moon", "io")),
            RecordOperation::add_to_related_records(planet("jupiter"), "moons", moon("io")),
        ])
        .unwrap();
    assert_eq!(planet_of(&cache, "io"), Some("jupiter".to_string()));

    let inverse = cache
        .patch(&[RecordOperation::remove_record(planet("jupiter"))])
        .unwrap();
    assert_eq!(cache.get_record(&moon("io")), Some(&Record::new("moon", "io")));
    assert_eq!(planet_of(&cache, "io"), None);
    check_invariants(&cache);

    cache.patch(&inverse).unwrap();
    assert_eq!(planet_of(&cache, "io"), Some("jupiter".to_string()));
    check_invariants(&cache);
}

#[test]
fn test_one_to_one_steal_and_undo() {
    let mut cache = RecordCache::new(missions());
    cache
        .patch(&[
            RecordOperation::add_record(
                Record::new("planet", "saturn").with_has_one("ring", Some(ring("alpha"))),
            ),
            RecordOperation::add_record(
                Record::new("planet", "uranus").with_has_one("ring", Some(ring("beta"))),
            ),
        ])
        .unwrap();
    let before = records(&cache);

    let inverse = cache
        .patch(&[RecordOperation::replace_related_record(
            ring("alpha"),
            "planet",
            Some(planet("uranus")),
        )])
        .unwrap();

    let ring_of = |cache: &RecordCache, id: &str| {
        cache
            .get_record(&planet(id))
            .and_then(|p| p.related_record("ring"))
            .cloned()
    };
    assert_eq!(ring_of(&cache, "uranus"), Some(ring("alpha")));
    assert_eq!(ring_of(&cache, "saturn"), None);
    assert_eq!(cache.get_record(&ring("beta")), Some(&Record::new("ring", "beta")));
    check_invariants(&cache);

    cache.patch(&inverse).unwrap();
    assert_eq!(records(&cache), before);
    check_invariants(&cache);
}

#[test]
fn test_many_to_many_links_both_sides() {
    let mut cache = RecordCache::new(missions());
    cache
        .patch(&[RecordOperation::add_record(
            Record::new("orbiter", "voyager")
                .with_has_many("targets", [planet("jupiter"), planet("saturn")]),
        )])
        .unwrap();
    let before = records(&cache);

    let inverse = cache
        .patch(&[
            RecordOperation::add_to_related_records(planet("jupiter"), "orbiters", orbiter("juno")),
            RecordOperation::replace_related_records(
                orbiter("voyager"),
                "targets",
                [planet("saturn")],
            ),
        ])
        .unwrap();

    let orbiters_of = |cache: &RecordCache, id: &str| -> Vec<String> {
        cache
            .get_record(&planet(id))
            .and_then(|p| p.related_records("orbiters"))
            .into_iter()
            .flatten()
            .map(|x| x.id.clone())
            .collect()
    };
    assert_eq!(orbiters_of(&cache, "jupiter"), vec!["juno"]);
    assert_eq!(orbiters_of(&cache, "saturn"), vec!["voyager"]);
    assert_eq!(
        cache.get_record(&orbiter("juno")),
        Some(&Record::new("orbiter", "juno").with_has_many("targets", [planet("jupiter")]))
    );
    check_invariants(&cache);

    cache.patch(&inverse).unwrap();
    assert_eq!(records(&cache), before);
    check_invariants(&cache);
}
