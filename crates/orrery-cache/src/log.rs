//! Transforms and the ordered log of applied transform ids.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::operation::RecordOperation;

/// Identifier of a transform. Generated ids are UUIDv4 strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformId(String);

impl TransformId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransformId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransformId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A batch of operations applied together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub id: TransformId,
    pub operations: Vec<RecordOperation>,
    pub created_at: DateTime<Utc>,
}

impl Transform {
    pub fn new(operations: Vec<RecordOperation>) -> Self {
        Self::with_id(TransformId::generate(), operations)
    }

    pub fn with_id(id: TransformId, operations: Vec<RecordOperation>) -> Self {
        Self {
            id,
            operations,
            created_at: Utc::now(),
        }
    }
}

/// Append-only sequence of transform ids, oldest first.
///
/// Positions are given relative to a logged id: `relative = 0` means the id
/// itself, negative values count back towards older entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformLog {
    entries: Vec<TransformId>,
}

impl TransformLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, id: TransformId) {
        debug!(transform = %id, "transform logged");
        self.entries.push(id);
    }

    /// The most recently logged id.
    pub fn head(&self) -> Option<&TransformId> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[TransformId] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &TransformId) -> bool {
        self.entries.contains(id)
    }

    fn index_of(&self, id: &TransformId) -> Result<usize, StoreError> {
        self.entries
            .iter()
            .position(|entry| entry == id)
            .ok_or_else(|| StoreError::TransformNotLogged(id.clone()))
    }

    /// Resolve `index + offset + relative` to a position in `0..=limit`.
    fn position(
        &self,
        id: &TransformId,
        offset: isize,
        relative: isize,
        limit: usize,
    ) -> Result<usize, StoreError> {
        let index = self.index_of(id)?;
        let position = index as isize + offset + relative;
        if position < 0 || position as usize > limit {
            return Err(StoreError::OutOfRange {
                id: id.clone(),
                position: relative,
            });
        }
        Ok(position as usize)
    }

    /// Ids logged after `id` (shifted by `relative`).
    pub fn after(&self, id: &TransformId, relative: isize) -> Result<Vec<TransformId>, StoreError> {
        let position = self.position(id, 1, relative, self.entries.len())?;
        Ok(self.entries[position..].to_vec())
    }

    /// Ids logged before `id` (shifted by `relative`).
    pub fn before(
        &self,
        id: &TransformId,
        relative: isize,
    ) -> Result<Vec<TransformId>, StoreError> {
        let position = self.position(id, 0, relative, self.entries.len())?;
        Ok(self.entries[..position].to_vec())
    }

    /// Drop every id before `id` (shifted by `relative`), returning them.
    pub fn truncate(
        &mut self,
        id: &TransformId,
        relative: isize,
    ) -> Result<Vec<TransformId>, StoreError> {
        let position = self.position(id, 0, relative, self.entries.len())?;
        let removed: Vec<TransformId> = self.entries.drain(..position).collect();
        debug!(transform = %id, removed = removed.len(), "log truncated");
        Ok(removed)
    }

    /// Drop every id after `id` (shifted by `relative`), returning them
    /// oldest first.
    pub fn rollback(
        &mut self,
        id: &TransformId,
        relative: isize,
    ) -> Result<Vec<TransformId>, StoreError> {
        let position = self.position(id, 1, relative, self.entries.len())?;
        let removed: Vec<TransformId> = self.entries.drain(position..).collect();
        debug!(transform = %id, removed = removed.len(), "log rolled back");
        Ok(removed)
    }

    /// Drop every id, returning them oldest first.
    pub fn clear(&mut self) -> Vec<TransformId> {
        debug!(removed = self.entries.len(), "log cleared");
        std::mem::take(&mut self.entries)
    }
}
