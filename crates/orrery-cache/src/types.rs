//! Record and identity types.
//!
//! Records never hold references to each other. Relationships are expressed
//! purely as [`RecordIdentity`] values and resolved through the cache on
//! demand, so cyclic record graphs need no special ownership handling.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The stable handle for a record: its model type and id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordIdentity {
    /// Model type name (e.g. "planet").
    #[serde(rename = "type")]
    pub type_name: String,
    /// Record id, unique within its type.
    pub id: String,
}

impl RecordIdentity {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// The value of one relationship on a record.
///
/// To-one values serialize as an identity object or `null`, to-many values as
/// an array of identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    ToMany(BTreeSet<RecordIdentity>),
    ToOne(Option<RecordIdentity>),
}

impl RelationshipData {
    /// Iterate over every identity this value references.
    pub fn members(&self) -> Box<dyn Iterator<Item = &RecordIdentity> + '_> {
        match self {
            RelationshipData::ToMany(set) => Box::new(set.iter()),
            RelationshipData::ToOne(one) => Box::new(one.iter()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            RelationshipData::ToMany(set) => set.is_empty(),
            RelationshipData::ToOne(one) => one.is_none(),
        }
    }
}

/// A typed, identified entity with keys, attributes and relationships.
///
/// Records held by the cache are always canonical (see [`Record::canonical`]):
/// null attributes, null to-one links and empty to-many sets are pruned, so
/// two records that look the same to every accessor also compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub identity: RecordIdentity,
    /// Secondary (e.g. remote) keys.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipData>,
}

impl Record {
    /// Create an empty record.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::stub(RecordIdentity::new(type_name, id))
    }

    /// Create an empty record for an identity.
    pub fn stub(identity: RecordIdentity) -> Self {
        Self {
            identity,
            keys: BTreeMap::new(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_has_one(
        mut self,
        name: impl Into<String>,
        related: Option<RecordIdentity>,
    ) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::ToOne(related));
        self
    }

    pub fn with_has_many(
        mut self,
        name: impl Into<String>,
        related: impl IntoIterator<Item = RecordIdentity>,
    ) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipData::ToMany(related.into_iter().collect()),
        );
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// The to-one related identity, if the relationship holds one.
    pub fn related_record(&self, relationship: &str) -> Option<&RecordIdentity> {
        match self.relationships.get(relationship) {
            Some(RelationshipData::ToOne(Some(related))) => Some(related),
            _ => None,
        }
    }

    /// The to-many related identities, if the relationship holds any.
    pub fn related_records(&self, relationship: &str) -> Option<&BTreeSet<RecordIdentity>> {
        match self.relationships.get(relationship) {
            Some(RelationshipData::ToMany(set)) => Some(set),
            _ => None,
        }
    }

    /// Whether `relationship` currently references `related`.
    pub fn references(&self, relationship: &str, related: &RecordIdentity) -> bool {
        self.relationships
            .get(relationship)
            .is_some_and(|data| data.members().any(|member| member == related))
    }

    /// Every `(relationship, related)` pair held by this record.
    pub fn relationship_members(&self) -> impl Iterator<Item = (&str, &RecordIdentity)> {
        self.relationships
            .iter()
            .flat_map(|(name, data)| data.members().map(move |member| (name.as_str(), member)))
    }

    /// True when the record carries no relationship members at all.
    pub fn is_relationship_free(&self) -> bool {
        self.relationships.values().all(RelationshipData::is_empty)
    }

    /// Canonical form: drops null attributes and empty relationship values.
    pub fn canonical(mut self) -> Self {
        self.attributes.retain(|_, value| !value.is_null());
        self.relationships.retain(|_, data| !data.is_empty());
        self
    }

    /// Set an attribute; `null` removes it.
    pub fn set_attribute(&mut self, name: &str, value: Value) {
        if value.is_null() {
            self.attributes.remove(name);
        } else {
            self.attributes.insert(name.to_string(), value);
        }
    }

    /// Set a key; `None` removes it.
    pub fn set_key(&mut self, name: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.keys.insert(name.to_string(), value);
            }
            None => {
                self.keys.remove(name);
            }
        }
    }

    pub fn set_related_record(&mut self, relationship: &str, related: Option<RecordIdentity>) {
        match related {
            Some(related) => {
                self.relationships.insert(
                    relationship.to_string(),
                    RelationshipData::ToOne(Some(related)),
                );
            }
            None => {
                self.relationships.remove(relationship);
            }
        }
    }

    pub fn set_related_records(&mut self, relationship: &str, related: BTreeSet<RecordIdentity>) {
        if related.is_empty() {
            self.relationships.remove(relationship);
        } else {
            self.relationships
                .insert(relationship.to_string(), RelationshipData::ToMany(related));
        }
    }

    /// Add a member to a to-many relationship. Returns false if already present.
    pub fn add_related_record(&mut self, relationship: &str, related: RecordIdentity) -> bool {
        let entry = self
            .relationships
            .entry(relationship.to_string())
            .or_insert_with(|| RelationshipData::ToMany(BTreeSet::new()));
        if let RelationshipData::ToOne(_) = entry {
            *entry = RelationshipData::ToMany(BTreeSet::new());
        }
        match entry {
            RelationshipData::ToMany(set) => set.insert(related),
            RelationshipData::ToOne(_) => false,
        }
    }

    /// Remove a member from a to-many relationship. Returns false if absent.
    pub fn remove_related_record(&mut self, relationship: &str, related: &RecordIdentity) -> bool {
        let Some(RelationshipData::ToMany(set)) = self.relationships.get_mut(relationship) else {
            return false;
        };
        let removed = set.remove(related);
        if set.is_empty() {
            self.relationships.remove(relationship);
        }
        removed
    }
}
