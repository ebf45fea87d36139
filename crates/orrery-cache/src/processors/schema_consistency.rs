use crate::accessor::RecordAccessor;
use crate::error::CacheResult;
use crate::operation::RecordOperation;
use crate::schema::RelationshipKind;
use crate::types::RecordIdentity;

use super::OperationProcessor;

/// Keeps schema-declared inverse relationships in sync and cascades
/// `dependent: remove` relationships.
#[derive(Debug, Default)]
pub struct SchemaConsistencyProcessor;

impl SchemaConsistencyProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl OperationProcessor for SchemaConsistencyProcessor {
    fn name(&self) -> &'static str {
        "schema-consistency"
    }

    fn after(
        &self,
        state: &mut dyn RecordAccessor,
        op: &RecordOperation,
    ) -> CacheResult<Vec<RecordOperation>> {
        let mut ops = Vec::new();
        match op {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                let Some(prior) = state.get_record(&record.identity) else {
                    return Ok(ops);
                };
                for (relationship, related) in prior.relationship_members() {
                    if !record.references(relationship, related) {
                        let identity = &record.identity;
                        ops.extend(remove_inverse(&*state, identity, relationship, related)?);
                    }
                }
            }
            RecordOperation::RemoveRecord { record } => {
                let Some(prior) = state.get_record(record) else {
                    return Ok(ops);
                };
                for (relationship, related) in prior.relationship_members() {
                    let definition = state.schema().relationship(&record.type_name, relationship)?;
                    if definition.is_dependent() {
                        ops.push(RecordOperation::remove_record(related.clone()));
                    } else {
                        ops.extend(remove_inverse(&*state, record, relationship, related)?);
                    }
                }
            }
            RecordOperation::RemoveFromRelatedRecords {
                record,
                relationship,
                related_record,
            } => {
                ops.extend(remove_inverse(&*state, record, relationship, related_record)?);
            }
            RecordOperation::ReplaceRelatedRecord {
                record,
                relationship,
                related_record,
            } => {
                let previous = state
                    .related_record(record, relationship)
                    .filter(|previous| Some(*previous) != related_record.as_ref());
                if let Some(previous) = previous {
                    ops.extend(remove_inverse(&*state, record, relationship, previous)?);
                }
            }
            RecordOperation::ReplaceRelatedRecords {
                record,
                relationship,
                related_records,
            } => {
                if let Some(previous) = state.related_records(record, relationship) {
                    for related in previous.iter().filter(|r| !related_records.contains(*r)) {
                        ops.extend(remove_inverse(&*state, record, relationship, related)?);
                    }
                }
            }
            RecordOperation::AddToRelatedRecords { .. }
            | RecordOperation::ReplaceAttribute { .. }
            | RecordOperation::ReplaceKey { .. } => {}
        }
        Ok(ops)
    }

    fn finally(
        &self,
        state: &mut dyn RecordAccessor,
        op: &RecordOperation,
    ) -> CacheResult<Vec<RecordOperation>> {
        let mut ops = Vec::new();
        match op {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                for (relationship, related) in record.relationship_members() {
                    ops.extend(add_inverse(&*state, &record.identity, relationship, related)?);
                }
            }
            RecordOperation::AddToRelatedRecords {
                record,
                relationship,
                related_record,
            } => {
                ops.extend(add_inverse(&*state, record, relationship, related_record)?);
            }
            RecordOperation::ReplaceRelatedRecord {
                record,
                relationship,
                related_record: Some(related),
            } => {
                ops.extend(add_inverse(&*state, record, relationship, related)?);
            }
            RecordOperation::ReplaceRelatedRecords {
                record,
                relationship,
                related_records,
            } => {
                for related in related_records {
                    ops.extend(add_inverse(&*state, record, relationship, related)?);
                }
            }
            _ => {}
        }
        Ok(ops)
    }
}

/// The operation that makes `related` point back at `record` through the
/// inverse of `relationship`, if one is declared.
fn add_inverse(
    state: &dyn RecordAccessor,
    record: &RecordIdentity,
    relationship: &str,
    related: &RecordIdentity,
) -> CacheResult<Option<RecordOperation>> {
    let inverse = state.schema().inverse_relationship(&record.type_name, relationship)?;
    let Some((inverse, definition)) = inverse else {
        return Ok(None);
    };
    let op = match definition.kind {
        RelationshipKind::HasMany => {
            RecordOperation::add_to_related_records(related.clone(), inverse, record.clone())
        }
        RelationshipKind::HasOne => {
            RecordOperation::replace_related_record(related.clone(), inverse, Some(record.clone()))
        }
    };
    Ok(Some(op))
}

/// The operation that stops `related` pointing back at `record`. A to-one
/// inverse is only cleared when it currently holds `record`.
fn remove_inverse(
    state: &dyn RecordAccessor,
    record: &RecordIdentity,
    relationship: &str,
    related: &RecordIdentity,
) -> CacheResult<Option<RecordOperation>> {
    let inverse = state.schema().inverse_relationship(&record.type_name, relationship)?;
    let Some((inverse, definition)) = inverse else {
        return Ok(None);
    };
    let op = match definition.kind {
        RelationshipKind::HasMany => Some(RecordOperation::remove_from_related_records(
            related.clone(),
            inverse,
            record.clone(),
        )),
        RelationshipKind::HasOne => (state.related_record(related, inverse) == Some(record))
            .then(|| RecordOperation::replace_related_record(related.clone(), inverse, None)),
    };
    Ok(op)
}
