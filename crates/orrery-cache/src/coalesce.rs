//! Folding redundant operations out of a sequence.

use crate::operation::RecordOperation;
use crate::types::RecordIdentity;

/// Fold redundant operations together without reordering anything.
///
/// Each operation is only ever folded into the operation immediately before it
/// in the output, and only when applying the shorter sequence to any cache
/// yields the same records as applying the original. `exists` reports whether
/// a record is present in, or referenced from, the cache the result will be
/// applied to.
///
/// Relationship operations are never folded.
pub fn coalesce_record_operations<F>(
    operations: Vec<RecordOperation>,
    exists: F,
) -> Vec<RecordOperation>
where
    F: Fn(&RecordIdentity) -> bool,
{
    let mut output: Vec<RecordOperation> = Vec::with_capacity(operations.len());
    for op in operations {
        let Some(last) = output.last_mut() else {
            output.push(op);
            continue;
        };
        match fold(last, op) {
            Fold::Merged => {}
            Fold::Cancel(op) => {
                let record = op.record();
                let earlier = &output[..output.len() - 1];
                let mentioned = earlier.iter().any(|prior| {
                    prior.record() == record || prior.related_identities().contains(&record)
                });
                if mentioned || exists(record) {
                    output.push(op);
                } else {
                    output.pop();
                }
            }
            Fold::Keep(op) => output.push(op),
        }
    }
    output
}

enum Fold {
    /// `op` was folded into the previous operation.
    Merged,
    /// `op` removes a record the previous operation added; the pair cancels
    /// unless something else depends on the record.
    Cancel(RecordOperation),
    Keep(RecordOperation),
}

fn fold(last: &mut RecordOperation, op: RecordOperation) -> Fold {
    if last.record() != op.record() {
        return Fold::Keep(op);
    }

    match (last, op) {
        (
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record },
            RecordOperation::ReplaceAttribute { attribute, value, .. },
        ) => {
            record.set_attribute(&attribute, value);
            Fold::Merged
        }
        (
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record },
            RecordOperation::ReplaceKey { key, value, .. },
        ) => {
            record.set_key(&key, value);
            Fold::Merged
        }
        (
            RecordOperation::ReplaceAttribute {
                attribute: previous,
                value: previous_value,
                ..
            },
            RecordOperation::ReplaceAttribute { attribute, value, .. },
        ) if *previous == attribute && !value.is_null() => {
            *previous_value = value;
            Fold::Merged
        }
        (
            RecordOperation::ReplaceKey {
                key: previous,
                value: previous_value,
                ..
            },
            RecordOperation::ReplaceKey { key, value, .. },
        ) if *previous == key && value.is_some() => {
            *previous_value = value;
            Fold::Merged
        }
        (
            last @ (RecordOperation::AddRecord { .. } | RecordOperation::UpdateRecord { .. }),
            op @ RecordOperation::UpdateRecord { .. },
        ) if !last.affects_relationships() => {
            *last = op;
            Fold::Merged
        }
        (last @ RecordOperation::AddRecord { .. }, op @ RecordOperation::RemoveRecord { .. })
            if !last.affects_relationships() =>
        {
            Fold::Cancel(op)
        }
        (_, op) => Fold::Keep(op),
    }
}
