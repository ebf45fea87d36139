//! The nine record operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Record, RecordIdentity};

/// A primitive mutation of a single record.
///
/// Serializes with an `op` tag and camelCase fields, e.g.
/// `{"op": "replaceAttribute", "record": {...}, "attribute": "name", "value": "Io"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RecordOperation {
    /// Insert a record, replacing any existing record with the same identity.
    AddRecord { record: Record },
    /// Replace a record's keys, attributes and relationships wholesale.
    #[serde(alias = "replaceRecord")]
    UpdateRecord { record: Record },
    RemoveRecord { record: RecordIdentity },
    ReplaceKey {
        record: RecordIdentity,
        key: String,
        value: Option<String>,
    },
    /// Set an attribute; `null` removes it.
    ReplaceAttribute {
        record: RecordIdentity,
        attribute: String,
        value: Value,
    },
    AddToRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },
    RemoveFromRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },
    ReplaceRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_records: Vec<RecordIdentity>,
    },
    ReplaceRelatedRecord {
        record: RecordIdentity,
        relationship: String,
        related_record: Option<RecordIdentity>,
    },
}

/// Discriminant of a [`RecordOperation`], for logging and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    AddRecord,
    UpdateRecord,
    RemoveRecord,
    ReplaceKey,
    ReplaceAttribute,
    AddToRelatedRecords,
    RemoveFromRelatedRecords,
    ReplaceRelatedRecords,
    ReplaceRelatedRecord,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AddRecord => "addRecord",
            OperationKind::UpdateRecord => "updateRecord",
            OperationKind::RemoveRecord => "removeRecord",
            OperationKind::ReplaceKey => "replaceKey",
            OperationKind::ReplaceAttribute => "replaceAttribute",
            OperationKind::AddToRelatedRecords => "addToRelatedRecords",
            OperationKind::RemoveFromRelatedRecords => "removeFromRelatedRecords",
            OperationKind::ReplaceRelatedRecords => "replaceRelatedRecords",
            OperationKind::ReplaceRelatedRecord => "replaceRelatedRecord",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RecordOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            RecordOperation::AddRecord { .. } => OperationKind::AddRecord,
            RecordOperation::UpdateRecord { .. } => OperationKind::UpdateRecord,
            RecordOperation::RemoveRecord { .. } => OperationKind::RemoveRecord,
            RecordOperation::ReplaceKey { .. } => OperationKind::ReplaceKey,
            RecordOperation::ReplaceAttribute { .. } => OperationKind::ReplaceAttribute,
            RecordOperation::AddToRelatedRecords { .. } => OperationKind::AddToRelatedRecords,
            RecordOperation::RemoveFromRelatedRecords { .. } => {
                OperationKind::RemoveFromRelatedRecords
            }
            RecordOperation::ReplaceRelatedRecords { .. } => OperationKind::ReplaceRelatedRecords,
            RecordOperation::ReplaceRelatedRecord { .. } => OperationKind::ReplaceRelatedRecord,
        }
    }

    /// The identity of the record this operation targets.
    pub fn record(&self) -> &RecordIdentity {
        match self {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                &record.identity
            }
            RecordOperation::RemoveRecord { record }
            | RecordOperation::ReplaceKey { record, .. }
            | RecordOperation::ReplaceAttribute { record, .. }
            | RecordOperation::AddToRelatedRecords { record, .. }
            | RecordOperation::RemoveFromRelatedRecords { record, .. }
            | RecordOperation::ReplaceRelatedRecords { record, .. }
            | RecordOperation::ReplaceRelatedRecord { record, .. } => record,
        }
    }

    /// Every identity this operation points at besides its target.
    pub fn related_identities(&self) -> Vec<&RecordIdentity> {
        match self {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                record.relationship_members().map(|(_, related)| related).collect()
            }
            RecordOperation::AddToRelatedRecords { related_record, .. }
            | RecordOperation::RemoveFromRelatedRecords { related_record, .. } => {
                vec![related_record]
            }
            RecordOperation::ReplaceRelatedRecords {
                related_records, ..
            } => related_records.iter().collect(),
            RecordOperation::ReplaceRelatedRecord { related_record, .. } => {
                related_record.iter().collect()
            }
            RecordOperation::RemoveRecord { .. }
            | RecordOperation::ReplaceKey { .. }
            | RecordOperation::ReplaceAttribute { .. } => Vec::new(),
        }
    }

    /// Whether applying this operation can change any relationship, either
    /// directly or through processor side effects.
    pub fn affects_relationships(&self) -> bool {
        match self {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                !record.is_relationship_free()
            }
            RecordOperation::ReplaceKey { .. } | RecordOperation::ReplaceAttribute { .. } => false,
            _ => true,
        }
    }

    pub fn add_record(record: Record) -> Self {
        RecordOperation::AddRecord { record }
    }

    pub fn update_record(record: Record) -> Self {
        RecordOperation::UpdateRecord { record }
    }

    pub fn remove_record(record: RecordIdentity) -> Self {
        RecordOperation::RemoveRecord { record }
    }

    pub fn replace_key(
        record: RecordIdentity,
        key: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        RecordOperation::ReplaceKey {
            record,
            key: key.into(),
            value,
        }
    }

    pub fn replace_attribute(
        record: RecordIdentity,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        RecordOperation::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn add_to_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        RecordOperation::AddToRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn remove_from_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        RecordOperation::RemoveFromRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn replace_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_records: impl IntoIterator<Item = RecordIdentity>,
    ) -> Self {
        RecordOperation::ReplaceRelatedRecords {
            record,
            relationship: relationship.into(),
            related_records: related_records.into_iter().collect(),
        }
    }

    pub fn replace_related_record(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: Option<RecordIdentity>,
    ) -> Self {
        RecordOperation::ReplaceRelatedRecord {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }
}
