//! Read-only queries over cache state.

use serde::{Deserialize, Serialize};

use crate::accessor::RecordAccessor;
use crate::error::{CacheError, CacheResult};
use crate::types::{Record, RecordIdentity};

/// A query against the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QueryExpression {
    FindRecord {
        record: RecordIdentity,
    },
    FindRecords {
        #[serde(rename = "type")]
        type_name: String,
    },
    FindRelatedRecord {
        record: RecordIdentity,
        relationship: String,
    },
    FindRelatedRecords {
        record: RecordIdentity,
        relationship: String,
    },
}

impl QueryExpression {
    pub fn find_record(record: RecordIdentity) -> Self {
        QueryExpression::FindRecord { record }
    }

    pub fn find_records(type_name: impl Into<String>) -> Self {
        QueryExpression::FindRecords {
            type_name: type_name.into(),
        }
    }

    pub fn find_related_record(record: RecordIdentity, relationship: impl Into<String>) -> Self {
        QueryExpression::FindRelatedRecord {
            record,
            relationship: relationship.into(),
        }
    }

    pub fn find_related_records(record: RecordIdentity, relationship: impl Into<String>) -> Self {
        QueryExpression::FindRelatedRecords {
            record,
            relationship: relationship.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Record(Option<Record>),
    Records(Vec<Record>),
}

impl QueryResult {
    pub fn into_record(self) -> Option<Record> {
        match self {
            QueryResult::Record(record) => record,
            QueryResult::Records(records) => records.into_iter().next(),
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            QueryResult::Record(record) => record.into_iter().collect(),
            QueryResult::Records(records) => records,
        }
    }
}

/// Evaluate a query. Records referenced by a relationship but absent from the
/// cache are skipped.
pub fn query(state: &dyn RecordAccessor, expression: &QueryExpression) -> CacheResult<QueryResult> {
    match expression {
        QueryExpression::FindRecord { record } => {
            state.schema().model(&record.type_name)?;
            let found = find(state, record)?;
            Ok(QueryResult::Record(Some(found.clone())))
        }
        QueryExpression::FindRecords { type_name } => {
            state.schema().model(type_name)?;
            Ok(QueryResult::Records(
                state.records_of_type(type_name).into_iter().cloned().collect(),
            ))
        }
        QueryExpression::FindRelatedRecord {
            record,
            relationship,
        } => {
            state.schema().relationship(&record.type_name, relationship)?;
            let related = find(state, record)?
                .related_record(relationship)
                .and_then(|related| state.get_record(related))
                .cloned();
            Ok(QueryResult::Record(related))
        }
        QueryExpression::FindRelatedRecords {
            record,
            relationship,
        } => {
            state.schema().relationship(&record.type_name, relationship)?;
            let related = find(state, record)?
                .related_records(relationship)
                .map(|set| {
                    set.iter()
                        .filter_map(|related| state.get_record(related))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            Ok(QueryResult::Records(related))
        }
    }
}

fn find<'a>(state: &'a dyn RecordAccessor, identity: &RecordIdentity) -> CacheResult<&'a Record> {
    state
        .get_record(identity)
        .ok_or_else(|| CacheError::RecordNotFound(identity.clone()))
}
