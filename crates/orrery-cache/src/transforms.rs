//! Forward patches and inverse computation for each operation kind.
//!
//! [`inverse_operation`] reads the state before an operation is applied and
//! returns the operation that undoes it, or `None` when the operation would
//! change nothing. [`apply_patch`] performs the mutation itself. Field and
//! relationship operations on an absent record create a stub record when they
//! carry a value; the inverse of such an operation is `removeRecord`.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::accessor::RecordAccessor;
use crate::operation::RecordOperation;
use crate::types::{Record, RecordIdentity};

/// Compute the operation that undoes `op` against the current state.
pub fn inverse_operation(
    state: &dyn RecordAccessor,
    op: &RecordOperation,
) -> Option<RecordOperation> {
    match op {
        RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
            match state.get_record(&record.identity) {
                None => Some(RecordOperation::remove_record(record.identity.clone())),
                Some(prior) if *prior == record.clone().canonical() => None,
                Some(prior) => Some(RecordOperation::update_record(prior.clone())),
            }
        }
        RecordOperation::RemoveRecord { record } => state
            .get_record(record)
            .map(|prior| RecordOperation::update_record(prior.clone())),
        RecordOperation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => match state.get_record(record) {
            None if value.is_null() => None,
            None => Some(RecordOperation::remove_record(record.clone())),
            Some(prior) => {
                let previous = prior.attribute(attribute).cloned().unwrap_or(Value::Null);
                (previous != *value).then(|| {
                    RecordOperation::replace_attribute(record.clone(), attribute.clone(), previous)
                })
            }
        },
        RecordOperation::ReplaceKey { record, key, value } => match state.get_record(record) {
            None if value.is_none() => None,
            None => Some(RecordOperation::remove_record(record.clone())),
            Some(prior) => {
                let previous = prior.key(key).map(str::to_string);
                (previous != *value)
                    .then(|| RecordOperation::replace_key(record.clone(), key.clone(), previous))
            }
        },
        RecordOperation::AddToRelatedRecords {
            record,
            relationship,
            related_record,
        } => match state.get_record(record) {
            None => Some(RecordOperation::remove_record(record.clone())),
            Some(prior) if prior.references(relationship, related_record) => None,
            Some(_) => Some(RecordOperation::remove_from_related_records(
                record.clone(),
                relationship.clone(),
                related_record.clone(),
            )),
        },
        RecordOperation::RemoveFromRelatedRecords {
            record,
            relationship,
            related_record,
        } => state
            .get_record(record)
            .filter(|prior| prior.references(relationship, related_record))
            .map(|_| {
                RecordOperation::add_to_related_records(
                    record.clone(),
                    relationship.clone(),
                    related_record.clone(),
                )
            }),
        RecordOperation::ReplaceRelatedRecords {
            record,
            relationship,
            related_records,
        } => {
            let replacement: BTreeSet<&RecordIdentity> = related_records.iter().collect();
            match state.get_record(record) {
                None if replacement.is_empty() => None,
                None => Some(RecordOperation::remove_record(record.clone())),
                Some(prior) => {
                    let previous: BTreeSet<&RecordIdentity> = prior
                        .related_records(relationship)
                        .map(|set| set.iter().collect())
                        .unwrap_or_default();
                    (previous != replacement).then(|| {
                        RecordOperation::replace_related_records(
                            record.clone(),
                            relationship.clone(),
                            previous.into_iter().cloned(),
                        )
                    })
                }
            }
        }
        RecordOperation::ReplaceRelatedRecord {
            record,
            relationship,
            related_record,
        } => match state.get_record(record) {
            None if related_record.is_none() => None,
            None => Some(RecordOperation::remove_record(record.clone())),
            Some(prior) => {
                let previous = prior.related_record(relationship).cloned();
                (previous != *related_record).then(|| {
                    RecordOperation::replace_related_record(
                        record.clone(),
                        relationship.clone(),
                        previous,
                    )
                })
            }
        },
    }
}

/// Apply `op` to the state. Returns whether anything changed.
pub fn apply_patch(state: &mut dyn RecordAccessor, op: &RecordOperation) -> bool {
    match op {
        RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
            let record = record.clone().canonical();
            if state.get_record(&record.identity) == Some(&record) {
                return false;
            }
            state.set_record(record);
            true
        }
        RecordOperation::RemoveRecord { record } => state.remove_record(record).is_some(),
        RecordOperation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => modify(state, record, !value.is_null(), |r| {
            r.set_attribute(attribute, value.clone())
        }),
        RecordOperation::ReplaceKey { record, key, value } => {
            modify(state, record, value.is_some(), |r| r.set_key(key, value.clone()))
        }
        RecordOperation::AddToRelatedRecords {
            record,
            relationship,
            related_record,
        } => modify(state, record, true, |r| {
            r.add_related_record(relationship, related_record.clone());
        }),
        RecordOperation::RemoveFromRelatedRecords {
            record,
            relationship,
            related_record,
        } => modify(state, record, false, |r| {
            r.remove_related_record(relationship, related_record);
        }),
        RecordOperation::ReplaceRelatedRecords {
            record,
            relationship,
            related_records,
        } => modify(state, record, !related_records.is_empty(), |r| {
            r.set_related_records(relationship, related_records.iter().cloned().collect())
        }),
        RecordOperation::ReplaceRelatedRecord {
            record,
            relationship,
            related_record,
        } => modify(state, record, related_record.is_some(), |r| {
            r.set_related_record(relationship, related_record.clone())
        }),
    }
}

/// Mutate one record in place, creating a stub first when `create` is set and
/// the record is absent.
fn modify(
    state: &mut dyn RecordAccessor,
    identity: &RecordIdentity,
    create: bool,
    update: impl FnOnce(&mut Record),
) -> bool {
    let prior = state.get_record(identity);
    let mut record = match prior {
        Some(record) => record.clone(),
        None if create => Record::stub(identity.clone()),
        None => return false,
    };
    update(&mut record);
    if prior == Some(&record) {
        return false;
    }
    state.set_record(record);
    true
}
