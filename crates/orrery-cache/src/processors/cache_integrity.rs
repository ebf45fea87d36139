use tracing::debug;

use crate::accessor::{InverseRelationship, RecordAccessor};
use crate::error::CacheResult;
use crate::operation::RecordOperation;
use crate::types::RecordIdentity;

use super::OperationProcessor;

/// Maintains the reverse-relationship index and, when a record is removed,
/// detaches it from every record that still points at it, whether or not the
/// relationship declares an inverse.
#[derive(Debug, Default)]
pub struct CacheIntegrityProcessor;

impl CacheIntegrityProcessor {
    pub fn new() -> Self {
        Self
    }
}

fn row(
    record: &RecordIdentity,
    relationship: &str,
    related: &RecordIdentity,
) -> InverseRelationship {
    InverseRelationship::new(record.clone(), relationship, related.clone())
}

impl OperationProcessor for CacheIntegrityProcessor {
    fn name(&self) -> &'static str {
        "cache-integrity"
    }

    fn after(
        &self,
        state: &mut dyn RecordAccessor,
        op: &RecordOperation,
    ) -> CacheResult<Vec<RecordOperation>> {
        let identity = op.record();
        let mut stale = Vec::new();
        let mut ops = Vec::new();

        match op {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                if let Some(prior) = state.get_record(identity) {
                    stale.extend(
                        prior
                            .relationship_members()
                            .filter(|(relationship, related)| {
                                !record.references(relationship, related)
                            })
                            .map(|(relationship, related)| row(identity, relationship, related)),
                    );
                }
            }
            RecordOperation::RemoveRecord { .. } => {
                for holder in state.inverse_relationships(identity) {
                    let Some(record) = state.get_record(&holder.record) else {
                        continue;
                    };
                    if record.related_record(&holder.relationship) == Some(identity) {
                        ops.push(RecordOperation::replace_related_record(
                            holder.record,
                            holder.relationship,
                            None,
                        ));
                    } else if record.references(&holder.relationship, identity) {
                        ops.push(RecordOperation::remove_from_related_records(
                            holder.record,
                            holder.relationship,
                            identity.clone(),
                        ));
                    }
                }
                if let Some(prior) = state.get_record(identity) {
                    stale.extend(
                        prior
                            .relationship_members()
                            .map(|(relationship, related)| row(identity, relationship, related)),
                    );
                }
            }
            RecordOperation::RemoveFromRelatedRecords {
                relationship,
                related_record,
                ..
            } => {
                stale.push(row(identity, relationship, related_record));
            }
            RecordOperation::ReplaceRelatedRecord {
                relationship,
                related_record,
                ..
            } => {
                let previous = state
                    .related_record(identity, relationship)
                    .filter(|previous| Some(*previous) != related_record.as_ref());
                if let Some(previous) = previous {
                    stale.push(row(identity, relationship, previous));
                }
            }
            RecordOperation::ReplaceRelatedRecords {
                relationship,
                related_records,
                ..
            } => {
                if let Some(previous) = state.related_records(identity, relationship) {
                    stale.extend(
                        previous
                            .iter()
                            .filter(|related| !related_records.contains(*related))
                            .map(|related| row(identity, relationship, related)),
                    );
                }
            }
            RecordOperation::AddToRelatedRecords { .. }
            | RecordOperation::ReplaceAttribute { .. }
            | RecordOperation::ReplaceKey { .. } => {}
        }

        if !stale.is_empty() {
            state.remove_inverse_relationships(stale);
        }
        Ok(ops)
    }

    fn finally(
        &self,
        state: &mut dyn RecordAccessor,
        op: &RecordOperation,
    ) -> CacheResult<Vec<RecordOperation>> {
        let identity = op.record();
        let rows: Vec<InverseRelationship> = match op {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                record
                    .relationship_members()
                    .map(|(relationship, related)| row(identity, relationship, related))
                    .collect()
            }
            RecordOperation::AddToRelatedRecords {
                relationship,
                related_record,
                ..
            }
            | RecordOperation::ReplaceRelatedRecord {
                relationship,
                related_record: Some(related_record),
                ..
            } => vec![row(identity, relationship, related_record)],
            RecordOperation::ReplaceRelatedRecords {
                relationship,
                related_records,
                ..
            } => related_records
                .iter()
                .map(|related| row(identity, relationship, related))
                .collect(),
            _ => Vec::new(),
        };
        if !rows.is_empty() {
            state.add_inverse_relationships(rows);
        }
        Ok(Vec::new())
    }

    fn reset(&self, state: &mut dyn RecordAccessor) {
        state.clear_inverse_relationships();
        let mut rows = Vec::new();
        for type_name in state.record_types() {
            for record in state.records_of_type(&type_name) {
                rows.extend(record.relationship_members().map(|(relationship, related)| {
                    row(&record.identity, relationship, related)
                }));
            }
        }
        debug!(rows = rows.len(), "rebuilt reverse-relationship index");
        state.add_inverse_relationships(rows);
    }
}
