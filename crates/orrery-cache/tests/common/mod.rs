//! Shared fixtures for the orrery-cache integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use orrery_cache::{
    InverseRelationship, Record, RecordCache, RecordIdentity, RecordOperation, Schema,
};
use proptest::prelude::*;
use serde_json::Value;

/// Planets own their moons (removing a planet removes its moons) and point
/// at a star that knows nothing about them.
pub const SOLAR_SYSTEM: &str = r#"{
    "models": {
        "planet": {
            "attributes": { "name": { "type": "string" } },
            "keys": { "remoteId": {} },
            "relationships": {
                "moons": { "kind": "hasMany", "model": "moon", "inverse": "planet", "dependent": "remove" },
                "star": { "kind": "hasOne", "model": "star" }
            }
        },
        "moon": {
            "attributes": { "name": { "type": "string" } },
            "relationships": {
                "planet": { "kind": "hasOne", "model": "planet", "inverse": "moons" }
            }
        },
        "star": {
            "attributes": { "name": { "type": "string" } }
        }
    }
}"#;

pub fn schema() -> Arc<Schema> {
    Arc::new(Schema::from_json(SOLAR_SYSTEM).unwrap())
}

pub fn planet(id: &str) -> RecordIdentity {
    RecordIdentity::new("planet", id)
}

pub fn moon(id: &str) -> RecordIdentity {
    RecordIdentity::new("moon", id)
}

pub fn star(id: &str) -> RecordIdentity {
    RecordIdentity::new("star", id)
}

pub fn records(cache: &RecordCache) -> Vec<Record> {
    cache.all_records().into_iter().cloned().collect()
}

/// Panics unless the cache is relationally consistent:
/// - every link with a declared inverse is mirrored by an existing record
/// - the reverse-relationship index holds exactly one row per link
pub fn check_invariants(cache: &RecordCache) {
    let schema = cache.schema();
    for record in cache.all_records() {
        for (relationship, related) in record.relationship_members() {
            let inverse = schema
                .inverse_relationship(&record.identity.type_name, relationship)
                .unwrap();
            let Some((inverse, _)) = inverse else {
                continue;
            };
            let mirrored = cache
                .get_record(related)
                .is_some_and(|r| r.references(inverse, &record.identity));
            assert!(
                mirrored,
                "{related} does not point back at {} via {inverse}",
                record.identity
            );
        }
    }

    let mut expected = BTreeSet::new();
    for record in cache.all_records() {
        for (relationship, related) in record.relationship_members() {
            expected.insert(InverseRelationship::new(
                record.identity.clone(),
                relationship,
                related.clone(),
            ));
        }
    }
    assert_eq!(cache.snapshot().state().all_inverse_relationships(), expected);
}

// Small id pools so generated operations keep colliding with each other.

pub fn planet_id() -> impl Strategy<Value = RecordIdentity> {
    prop_oneof![Just("mercury"), Just("venus"), Just("earth")].prop_map(planet)
}

pub fn moon_id() -> impl Strategy<Value = RecordIdentity> {
    prop_oneof![Just("luna"), Just("phobos"), Just("deimos"), Just("io")].prop_map(moon)
}

pub fn star_id() -> impl Strategy<Value = RecordIdentity> {
    prop_oneof![Just("sun"), Just("sirius")].prop_map(star)
}

pub fn any_id() -> impl Strategy<Value = RecordIdentity> {
    prop_oneof![planet_id(), moon_id(), star_id()]
}

fn name() -> impl Strategy<Value = Option<String>> {
    proptest::option::of(prop_oneof![Just("Alpha".to_string()), Just("Beta".to_string())])
}

fn moon_set() -> impl Strategy<Value = BTreeSet<RecordIdentity>> {
    prop::collection::btree_set(moon_id(), 0..3)
}

pub fn planet_record() -> impl Strategy<Value = Record> {
    (
        planet_id(),
        name(),
        proptest::option::of("[a-z]{2}"),
        moon_set(),
        proptest::option::of(star_id()),
    )
        .prop_map(|(identity, name, remote_id, moons, star)| {
            let mut record = Record::stub(identity)
                .with_has_many("moons", moons)
                .with_has_one("star", star);
            if let Some(name) = name {
                record = record.with_attribute("name", name);
            }
            if let Some(remote_id) = remote_id {
                record = record.with_key("remoteId", remote_id);
            }
            record.canonical()
        })
}

pub fn moon_record() -> impl Strategy<Value = Record> {
    (moon_id(), name(), proptest::option::of(planet_id())).prop_map(|(identity, name, owner)| {
        let mut record = Record::stub(identity).with_has_one("planet", owner);
        if let Some(name) = name {
            record = record.with_attribute("name", name);
        }
        record.canonical()
    })
}

pub fn star_record() -> impl Strategy<Value = Record> {
    (star_id(), name()).prop_map(|(identity, name)| {
        let record = Record::stub(identity);
        match name {
            Some(name) => record.with_attribute("name", name),
            None => record,
        }
    })
}

pub fn any_record() -> impl Strategy<Value = Record> {
    prop_oneof![planet_record(), moon_record(), star_record()]
}

/// Any schema-valid operation on the solar system.
pub fn operation() -> impl Strategy<Value = RecordOperation> {
    prop_oneof![
        3 => any_record().prop_map(RecordOperation::add_record),
        2 => any_record().prop_map(RecordOperation::update_record),
        2 => any_id().prop_map(RecordOperation::remove_record),
        1 => (planet_id(), proptest::option::of("[a-z]{2}"))
            .prop_map(|(p, value)| RecordOperation::replace_key(p, "remoteId", value)),
        2 => (any_id(), name()).prop_map(|(identity, name)| {
            let value = name.map_or(Value::Null, Value::from);
            RecordOperation::replace_attribute(identity, "name", value)
        }),
        2 => (planet_id(), moon_id())
            .prop_map(|(p, m)| RecordOperation::add_to_related_records(p, "moons", m)),
        1 => (planet_id(), moon_id())
            .prop_map(|(p, m)| RecordOperation::remove_from_related_records(p, "moons", m)),
        1 => (planet_id(), moon_set())
            .prop_map(|(p, moons)| RecordOperation::replace_related_records(p, "moons", moons)),
        2 => (moon_id(), proptest::option::of(planet_id()))
            .prop_map(|(m, p)| RecordOperation::replace_related_record(m, "planet", p)),
        1 => (planet_id(), proptest::option::of(star_id()))
            .prop_map(|(p, s)| RecordOperation::replace_related_record(p, "star", s)),
    ]
}

pub fn operations(max: usize) -> impl Strategy<Value = Vec<RecordOperation>> {
    prop::collection::vec(operation(), 0..max)
}

/// Every declared inverse pairing, none of them dependent: planets and moons
/// (one-to-many), planets and rings (one-to-one), planets and orbiters
/// (many-to-many).
pub const MISSIONS: &str = r#"{
    "models": {
        "planet": {
            "attributes": { "name": { "type": "string" } },
            "relationships": {
                "moons": { "kind": "hasMany", "model": "moon", "inverse": "planet" },
                "ring": { "kind": "hasOne", "model": "ring", "inverse": "planet" },
                "orbiters": { "kind": "hasMany", "model": "orbiter", "inverse": "targets" }
            }
        },
        "moon": {
            "attributes": { "name": { "type": "string" } },
            "relationships": {
                "planet": { "kind": "hasOne", "model": "planet", "inverse": "moons" }
            }
        },
        "ring": {
            "relationships": {
                "planet": { "kind": "hasOne", "model": "planet", "inverse": "ring" }
            }
        },
        "orbiter": {
            "relationships": {
                "targets": { "kind": "hasMany", "model": "planet", "inverse": "orbiters" }
            }
        }
    }
}"#;

pub fn missions() -> Arc<Schema> {
    Arc::new(Schema::from_json(MISSIONS).unwrap())
}

pub fn ring(id: &str) -> RecordIdentity {
    RecordIdentity::new("ring", id)
}

pub fn orbiter(id: &str) -> RecordIdentity {
    RecordIdentity::new("orbiter", id)
}

pub fn ring_id() -> impl Strategy<Value = RecordIdentity> {
    prop_oneof![Just("alpha"), Just("beta"), Just("gamma")].prop_map(ring)
}

pub fn orbiter_id() -> impl Strategy<Value = RecordIdentity> {
    prop_oneof![Just("voyager"), Just("juno"), Just("cassini")].prop_map(orbiter)
}

fn planet_set() -> impl Strategy<Value = BTreeSet<RecordIdentity>> {
    prop::collection::btree_set(planet_id(), 0..3)
}

fn orbiter_set() -> impl Strategy<Value = BTreeSet<RecordIdentity>> {
    prop::collection::btree_set(orbiter_id(), 0..3)
}

fn mission_record() -> impl Strategy<Value = Record> {
    prop_oneof![
        (planet_id(), name(), moon_set(), proptest::option::of(ring_id()), orbiter_set()).prop_map(
            |(identity, name, moons, ring, orbiters)| {
                let mut record = Record::stub(identity)
                    .with_has_many("moons", moons)
                    .with_has_one("ring", ring)
                    .with_has_many("orbiters", orbiters);
                if let Some(name) = name {
                    record = record.with_attribute("name", name);
                }
                record.canonical()
            }
        ),
        (moon_id(), proptest::option::of(planet_id())).prop_map(|(identity, owner)| {
            Record::stub(identity).with_has_one("planet", owner).canonical()
        }),
        (ring_id(), proptest::option::of(planet_id())).prop_map(|(identity, owner)| {
            Record::stub(identity).with_has_one("planet", owner).canonical()
        }),
        (orbiter_id(), planet_set()).prop_map(|(identity, targets)| {
            Record::stub(identity).with_has_many("targets", targets).canonical()
        }),
    ]
}

fn mission_id() -> impl Strategy<Value = RecordIdentity> {
    prop_oneof![planet_id(), moon_id(), ring_id(), orbiter_id()]
}

/// Any schema-valid operation on the missions schema.
pub fn mission_operation() -> impl Strategy<Value = RecordOperation> {
    prop_oneof![
        3 => mission_record().prop_map(RecordOperation::add_record),
        2 => mission_record().prop_map(RecordOperation::update_record),
        2 => mission_id().prop_map(RecordOperation::remove_record),
        1 => (planet_id(), name()).prop_map(|(p, name)| {
            RecordOperation::replace_attribute(p, "name", name.map_or(Value::Null, Value::from))
        }),
        2 => (planet_id(), moon_id())
            .prop_map(|(p, m)| RecordOperation::add_to_related_records(p, "moons", m)),
        2 => (moon_id(), proptest::option::of(planet_id()))
            .prop_map(|(m, p)| RecordOperation::replace_related_record(m, "planet", p)),
        2 => (planet_id(), proptest::option::of(ring_id()))
            .prop_map(|(p, r)| RecordOperation::replace_related_record(p, "ring", r)),
        2 => (ring_id(), proptest::option::of(planet_id()))
            .prop_map(|(r, p)| RecordOperation::replace_related_record(r, "planet", p)),
        2 => (planet_id(), orbiter_id())
            .prop_map(|(p, x)| RecordOperation::add_to_related_records(p, "orbiters", x)),
        1 => (orbiter_id(), planet_id())
            .prop_map(|(x, p)| RecordOperation::remove_from_related_records(x, "targets", p)),
        1 => (orbiter_id(), planet_set()).prop_map(|(x, targets)| {
            RecordOperation::replace_related_records(x, "targets", targets)
        }),
        1 => (planet_id(), moon_set())
            .prop_map(|(p, moons)| RecordOperation::replace_related_records(p, "moons", moons)),
    ]
}

pub fn mission_operations(max: usize) -> impl Strategy<Value = Vec<RecordOperation>> {
    prop::collection::vec(mission_operation(), 0..max)
}
