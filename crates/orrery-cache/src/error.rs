//! Error types for the record cache.

use thiserror::Error;

use crate::log::TransformId;
use crate::operation::OperationKind;
use crate::schema::RelationshipKind;
use crate::types::RecordIdentity;

/// Errors from schema lookups and schema loading.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No model is declared for this type.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The model declares no such relationship.
    #[error("relationship not found: {model}.{relationship}")]
    RelationshipNotFound { model: String, relationship: String },

    /// A declared inverse does not point back at its relationship.
    #[error("inverse of {model}.{relationship} does not mirror it")]
    InverseMismatch { model: String, relationship: String },

    /// Schema JSON could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An operation rejected before any mutation took place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{op} targets unknown model '{model}'")]
    UnknownModel { op: OperationKind, model: String },

    #[error("{op} targets unknown relationship {model}.{relationship}")]
    UnknownRelationship {
        op: OperationKind,
        model: String,
        relationship: String,
    },

    #[error("{op} sets undeclared attribute {model}.{attribute}")]
    UnknownAttribute {
        op: OperationKind,
        model: String,
        attribute: String,
    },

    #[error("{op} sets undeclared key {model}.{key}")]
    UnknownKey {
        op: OperationKind,
        model: String,
        key: String,
    },

    #[error("{op} cannot be applied to {model}.{relationship}, which is {kind:?}")]
    RelationshipKindMismatch {
        op: OperationKind,
        model: String,
        relationship: String,
        kind: RelationshipKind,
    },

    #[error("{model}.{relationship} expects '{expected}' records, got {related}")]
    RelatedTypeMismatch {
        model: String,
        relationship: String,
        expected: String,
        related: RecordIdentity,
    },
}

/// Errors raised by the record cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Schema lookup failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An operation failed validation; nothing was applied.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A record required by a query does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(RecordIdentity),

    /// Processor-derived operations nested deeper than allowed.
    #[error("cascade depth {depth} exceeded while applying {op} on {record}")]
    CascadeDepthExceeded {
        depth: usize,
        op: OperationKind,
        record: RecordIdentity,
    },

    /// An earlier patch failed part-way; the cache must be reset.
    #[error("cache is poisoned by an earlier failed patch")]
    Poisoned,
}

/// Errors raised by the store and its transform log.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The transform id is not in the log.
    #[error("transform not logged: {0}")]
    TransformNotLogged(TransformId),

    /// A relative position points outside the log.
    #[error("position {position} relative to transform {id} is outside the log")]
    OutOfRange { id: TransformId, position: isize },
}

/// Invalid cache settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
