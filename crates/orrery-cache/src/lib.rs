//! Normalized, relationally consistent record cache for Orrery.
//!
//! Records are typed, identified entities whose relationships are expressed
//! as identities. They are mutated only through [`RecordOperation`]s, which
//! the cache applies through a pipeline of operation processors that keep
//! inverse relationships, the reverse-relationship index and dependent
//! removals consistent.
//!
//! ## Features
//!
//! - **Immutable maps**: persistent hash tries, so snapshots and forks are cheap
//! - **Record cache**: `patch` returns exact inverse operations for undo
//! - **Processors**: schema validation, schema consistency, cache integrity
//! - **Store**: transform log with fork, merge (optionally coalesced), rebase,
//!   rollback and history truncation

pub mod accessor;
pub mod cache;
pub mod coalesce;
mod config;
mod error;
pub mod immutable_map;
pub mod log;
mod operation;
pub mod processors;
pub mod query;
mod schema;
pub mod store;
pub mod transforms;
mod types;

pub use accessor::{CacheState, InverseRelationship, RecordAccessor};
pub use cache::{CacheEvent, CacheSnapshot, RecordCache};
pub use coalesce::coalesce_record_operations;
pub use config::{CacheSettings, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_CASCADE_DEPTH};
pub use error::{CacheError, CacheResult, SchemaError, SettingsError, StoreError, ValidationError};
pub use immutable_map::ImmutableMap;
pub use log::{Transform, TransformId, TransformLog};
pub use operation::{OperationKind, RecordOperation};
pub use query::{QueryExpression, QueryResult};
pub use schema::{
    AttributeDefinition, Dependent, KeyDefinition, ModelDefinition, RelationshipDefinition,
    RelationshipKind, Schema,
};
pub use store::{MergeOptions, Store};
pub use types::{Record, RecordIdentity, RelationshipData};
