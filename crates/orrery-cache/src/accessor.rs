//! Read/write access to cache state for processors and transforms.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::immutable_map::ImmutableMap;
use crate::schema::Schema;
use crate::types::{Record, RecordIdentity};

/// One row of the reverse-relationship index: `record.relationship` holds
/// `related_record`. Rows are looked up by `related_record`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverseRelationship {
    pub record: RecordIdentity,
    pub relationship: String,
    pub related_record: RecordIdentity,
}

impl InverseRelationship {
    pub fn new(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        Self {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }
}

/// The contract processors and transforms use to read and mutate a cache.
pub trait RecordAccessor {
    fn schema(&self) -> &Schema;

    fn get_record(&self, identity: &RecordIdentity) -> Option<&Record>;

    fn records_of_type(&self, type_name: &str) -> Vec<&Record>;

    /// Every type that currently holds at least one record.
    fn record_types(&self) -> Vec<String>;

    /// Store a record, replacing any record with the same identity.
    fn set_record(&mut self, record: Record);

    /// Remove a record, returning it if it was present.
    fn remove_record(&mut self, identity: &RecordIdentity) -> Option<Arc<Record>>;

    fn related_record(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Option<&RecordIdentity> {
        self.get_record(identity)?.related_record(relationship)
    }

    fn related_records(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Option<&BTreeSet<RecordIdentity>> {
        self.get_record(identity)?.related_records(relationship)
    }

    /// Rows of the reverse index whose `related_record` is `identity`.
    fn inverse_relationships(&self, identity: &RecordIdentity) -> Vec<InverseRelationship>;

    fn add_inverse_relationships(&mut self, rows: Vec<InverseRelationship>);

    fn remove_inverse_relationships(&mut self, rows: Vec<InverseRelationship>);

    /// Drop every reverse-index row.
    fn clear_inverse_relationships(&mut self);
}

type RecordBucket = ImmutableMap<String, Record>;
type InverseBucket = ImmutableMap<String, BTreeSet<InverseRelationship>>;

/// In-memory cache state: records and reverse index, one persistent map per
/// model type. Cloning is cheap and the clone shares every map.
#[derive(Debug, Clone)]
pub struct CacheState {
    schema: Arc<Schema>,
    records: BTreeMap<String, RecordBucket>,
    inverse: BTreeMap<String, InverseBucket>,
}

impl CacheState {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            records: BTreeMap::new(),
            inverse: BTreeMap::new(),
        }
    }

    pub fn schema_arc(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(ImmutableMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record, ordered by type and then id.
    pub fn all_records(&self) -> Vec<&Record> {
        self.records
            .keys()
            .flat_map(|type_name| self.records_of_type(type_name))
            .collect()
    }

    /// Every reverse-index row.
    pub fn all_inverse_relationships(&self) -> BTreeSet<InverseRelationship> {
        self.inverse
            .values()
            .flat_map(|bucket| bucket.values())
            .flat_map(|rows| rows.iter().cloned())
            .collect()
    }

    /// True when both states hold the very same maps for every type.
    pub fn shares_structure(&self, other: &Self) -> bool {
        fn same<V>(
            a: &BTreeMap<String, ImmutableMap<String, V>>,
            b: &BTreeMap<String, ImmutableMap<String, V>>,
        ) -> bool {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, ma), (kb, mb))| ka == kb && ma.ptr_eq(mb))
        }
        same(&self.records, &other.records) && same(&self.inverse, &other.inverse)
    }

    fn update_inverse_bucket(
        &mut self,
        related: &RecordIdentity,
        update: impl FnOnce(&mut BTreeSet<InverseRelationship>),
    ) {
        let bucket = self.inverse.get(&related.type_name).cloned().unwrap_or_default();
        let mut rows = bucket.get(&related.id).cloned().unwrap_or_default();
        update(&mut rows);

        let bucket = if rows.is_empty() {
            bucket.remove(&related.id)
        } else {
            bucket.insert(related.id.clone(), rows)
        };
        if bucket.is_empty() {
            self.inverse.remove(&related.type_name);
        } else {
            self.inverse.insert(related.type_name.clone(), bucket);
        }
    }
}

impl RecordAccessor for CacheState {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn get_record(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.records.get(&identity.type_name)?.get(&identity.id)
    }

    fn records_of_type(&self, type_name: &str) -> Vec<&Record> {
        let Some(bucket) = self.records.get(type_name) else {
            return Vec::new();
        };
        let mut records: Vec<&Record> = bucket.values().collect();
        records.sort_by(|a, b| a.identity.id.cmp(&b.identity.id));
        records
    }

    fn record_types(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    fn set_record(&mut self, record: Record) {
        let bucket = self
            .records
            .get(&record.identity.type_name)
            .cloned()
            .unwrap_or_default();
        let type_name = record.identity.type_name.clone();
        let bucket = bucket.insert(record.identity.id.clone(), record);
        self.records.insert(type_name, bucket);
    }

    fn remove_record(&mut self, identity: &RecordIdentity) -> Option<Arc<Record>> {
        let bucket = self.records.get(&identity.type_name)?;
        let removed = bucket.get_shared(&identity.id)?;
        let bucket = bucket.remove(&identity.id);
        if bucket.is_empty() {
            self.records.remove(&identity.type_name);
        } else {
            self.records.insert(identity.type_name.clone(), bucket);
        }
        Some(removed)
    }

    fn inverse_relationships(&self, identity: &RecordIdentity) -> Vec<InverseRelationship> {
        self.inverse
            .get(&identity.type_name)
            .and_then(|bucket| bucket.get(&identity.id))
            .map(|rows| rows.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn add_inverse_relationships(&mut self, rows: Vec<InverseRelationship>) {
        for row in rows {
            let related = row.related_record.clone();
            self.update_inverse_bucket(&related, |existing| {
                existing.insert(row);
            });
        }
    }

    fn remove_inverse_relationships(&mut self, rows: Vec<InverseRelationship>) {
        for row in rows {
            self.update_inverse_bucket(&row.related_record, |existing| {
                existing.remove(&row);
            });
        }
    }

    fn clear_inverse_relationships(&mut self) {
        self.inverse.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state() -> CacheState {
        CacheState::new(Arc::new(Schema::new()))
    }

    fn jupiter() -> RecordIdentity {
        RecordIdentity::new("planet", "jupiter")
    }

    fn io() -> RecordIdentity {
        RecordIdentity::new("moon", "io")
    }

    #[test]
    fn test_set_get_remove() {
        let mut state = state();
        state.set_record(Record::new("planet", "jupiter").with_attribute("name", "Jupiter"));
        state.set_record(Record::new("moon", "io"));

        assert_eq!(state.record_count(), 2);
        assert_eq!(
            state.get_record(&jupiter()).and_then(|r| r.attribute("name")),
            Some(&serde_json::json!("Jupiter"))
        );
        assert_eq!(state.record_types(), vec!["moon", "planet"]);

        let removed = state.remove_record(&io()).unwrap();
        assert_eq!(removed.identity, io());
        assert!(state.remove_record(&io()).is_none());
        assert_eq!(state.record_types(), vec!["planet"]);
    }

    #[test]
    fn test_records_of_type_sorted() {
        let mut state = state();
        for id in ["europa", "io", "callisto", "ganymede"] {
            state.set_record(Record::new("moon", id));
        }
        let ids: Vec<_> = state
            .records_of_type("moon")
            .into_iter()
            .map(|r| r.identity.id.as_str())
            .collect();
        assert_eq!(ids, vec!["callisto", "europa", "ganymede", "io"]);
        assert!(state.records_of_type("comet").is_empty());
    }

    #[test]
    fn test_inverse_index() {
        let mut state = state();
        let row = InverseRelationship::new(jupiter(), "moons", io());
        state.add_inverse_relationships(vec![row.clone(), row.clone()]);
        assert_eq!(state.inverse_relationships(&io()), vec![row.clone()]);
        assert!(state.inverse_relationships(&jupiter()).is_empty());

        state.remove_inverse_relationships(vec![row]);
        assert!(state.inverse_relationships(&io()).is_empty());
        assert!(state.all_inverse_relationships().is_empty());
    }

    #[test]
    fn test_clone_shares_structure() {
        let mut state = state();
        state.set_record(Record::new("planet", "jupiter"));
        let mut fork = state.clone();
        assert!(fork.shares_structure(&state));

        fork.set_record(Record::new("planet", "saturn"));
        assert!(!fork.shares_structure(&state));
        assert_eq!(state.record_count(), 1);
        assert_eq!(fork.record_count(), 2);
    }
}
