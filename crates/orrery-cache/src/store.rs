//! A record cache with transform history: fork, merge, rebase, rollback.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::{CacheEvent, CacheSnapshot, RecordCache};
use crate::coalesce::coalesce_record_operations;
use crate::config::CacheSettings;
use crate::error::{SettingsError, StoreError};
use crate::log::{Transform, TransformId, TransformLog};
use crate::operation::RecordOperation;
use crate::query::{QueryExpression, QueryResult};
use crate::schema::Schema;

/// Options for [`Store::merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Fold redundant operations before applying them.
    pub coalesce: bool,
    /// Only merge transforms logged after this one.
    pub since_transform_id: Option<TransformId>,
}

impl MergeOptions {
    pub fn coalesced() -> Self {
        Self {
            coalesce: true,
            since_transform_id: None,
        }
    }

    pub fn since(mut self, id: TransformId) -> Self {
        self.since_transform_id = Some(id);
        self
    }
}

/// A [`RecordCache`] plus the log of transforms applied to it.
#[derive(Debug)]
pub struct Store {
    cache: RecordCache,
    log: TransformLog,
    transforms: HashMap<TransformId, Transform>,
    inverse_operations: HashMap<TransformId, Vec<RecordOperation>>,
    fork_point: Option<TransformId>,
}

impl Store {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::from_cache(RecordCache::new(schema))
    }

    pub fn with_settings(
        schema: Arc<Schema>,
        settings: CacheSettings,
    ) -> Result<Self, SettingsError> {
        Ok(Self::from_cache(RecordCache::with_settings(schema, settings)?))
    }

    fn from_cache(cache: RecordCache) -> Self {
        Self {
            cache,
            log: TransformLog::new(),
            transforms: HashMap::new(),
            inverse_operations: HashMap::new(),
            fork_point: None,
        }
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn log(&self) -> &TransformLog {
        &self.log
    }

    /// The base transform this store was forked at, if it is a fork.
    pub fn fork_point(&self) -> Option<&TransformId> {
        self.fork_point.as_ref()
    }

    /// Apply `operations` as a new transform and return its id.
    pub fn update(&mut self, operations: Vec<RecordOperation>) -> Result<TransformId, StoreError> {
        let transform = Transform::new(operations);
        let id = transform.id.clone();
        self.apply(transform)?;
        Ok(id)
    }

    /// Apply and log a transform. Returns false if it was already logged.
    pub fn apply(&mut self, transform: Transform) -> Result<bool, StoreError> {
        if self.log.contains(&transform.id) {
            debug!(transform = %transform.id, "transform already applied, skipping");
            return Ok(false);
        }
        let inverse = self.cache.patch(&transform.operations)?;
        debug!(
            transform = %transform.id,
            operations = transform.operations.len(),
            inverse = inverse.len(),
            "transform applied"
        );
        self.log.append(transform.id.clone());
        self.inverse_operations.insert(transform.id.clone(), inverse);
        self.transforms.insert(transform.id.clone(), transform);
        Ok(true)
    }

    /// A new store that starts from this store's current records, with an
    /// empty history.
    pub fn fork(&self) -> Store {
        let mut fork = Self::from_cache(self.cache.fork());
        fork.fork_point = self.log.head().cloned();
        debug!(fork_point = ?fork.fork_point, "store forked");
        fork
    }

    /// Apply the transforms of `forked` to this store as a single transform.
    pub fn merge(
        &mut self,
        forked: &Store,
        options: MergeOptions,
    ) -> Result<TransformId, StoreError> {
        let transforms = match &options.since_transform_id {
            Some(id) => forked.transforms_since(id)?,
            None => forked.all_transforms(),
        };
        let mut operations: Vec<RecordOperation> = transforms
            .into_iter()
            .flat_map(|transform| transform.operations.iter().cloned())
            .collect();
        let gathered = operations.len();
        if options.coalesce {
            let cache = &self.cache;
            operations = coalesce_record_operations(operations, |identity| {
                cache.get_record(identity).is_some()
                    || !cache.inverse_relationships(identity).is_empty()
            });
        }
        debug!(gathered, merged = operations.len(), "merging fork");
        self.update(operations)
    }

    /// Replay this fork on top of `base`: undo local transforms, apply the
    /// base transforms logged since the fork point, then reapply the local
    /// transforms. The fork point moves to the base's head.
    pub fn rebase(&mut self, base: &Store) -> Result<(), StoreError> {
        let upstream: Vec<Transform> = match &self.fork_point {
            Some(id) => base.transforms_since(id)?,
            None => base.all_transforms(),
        }
        .into_iter()
        .cloned()
        .collect();
        let local: Vec<TransformId> = self.log.entries().to_vec();

        for id in local.iter().rev() {
            let inverse = self.inverse_operations.get(id).cloned().unwrap_or_default();
            self.cache.patch(&inverse)?;
        }
        for transform in &upstream {
            self.cache.patch(&transform.operations)?;
        }
        for id in &local {
            let Some(transform) = self.transforms.get(id) else {
                continue;
            };
            let inverse = self.cache.patch(&transform.operations)?;
            self.inverse_operations.insert(id.clone(), inverse);
        }

        self.fork_point = base.log.head().cloned();
        debug!(
            upstream = upstream.len(),
            local = local.len(),
            fork_point = ?self.fork_point,
            "store rebased"
        );
        Ok(())
    }

    /// Undo every transform logged after `id` (shifted by `relative`),
    /// newest first, and drop them from the history.
    pub fn rollback(&mut self, id: &TransformId, relative: isize) -> Result<(), StoreError> {
        let undone = self.log.after(id, relative)?;
        for undone_id in undone.iter().rev() {
            let inverse = self.inverse_operations.get(undone_id).cloned().unwrap_or_default();
            self.cache.patch(&inverse)?;
        }
        self.log.rollback(id, relative)?;
        self.forget(&undone);
        debug!(transform = %id, undone = undone.len(), "store rolled back");
        Ok(())
    }

    /// Forget every transform logged before `id` (shifted by `relative`).
    /// Records are unchanged.
    pub fn truncate_history(
        &mut self,
        id: &TransformId,
        relative: isize,
    ) -> Result<(), StoreError> {
        let removed = self.log.truncate(id, relative)?;
        self.forget(&removed);
        Ok(())
    }

    /// Forget every transform. Records are unchanged.
    pub fn clear_history(&mut self) {
        let removed = self.log.clear();
        self.forget(&removed);
    }

    fn forget(&mut self, ids: &[TransformId]) {
        for id in ids {
            self.transforms.remove(id);
            self.inverse_operations.remove(id);
        }
    }

    /// Transforms logged after `id`, oldest first.
    pub fn transforms_since(&self, id: &TransformId) -> Result<Vec<&Transform>, StoreError> {
        Ok(self
            .log
            .after(id, 0)?
            .iter()
            .filter_map(|id| self.transforms.get(id))
            .collect())
    }

    /// Every logged transform, oldest first.
    pub fn all_transforms(&self) -> Vec<&Transform> {
        self.log
            .entries()
            .iter()
            .filter_map(|id| self.transforms.get(id))
            .collect()
    }

    pub fn get_transform(&self, id: &TransformId) -> Result<&Transform, StoreError> {
        self.transforms
            .get(id)
            .ok_or_else(|| StoreError::TransformNotLogged(id.clone()))
    }

    /// The operations that undo transform `id`, in application order.
    pub fn get_inverse_operations(
        &self,
        id: &TransformId,
    ) -> Result<&[RecordOperation], StoreError> {
        self.inverse_operations
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::TransformNotLogged(id.clone()))
    }

    pub fn query(&self, expression: &QueryExpression) -> Result<QueryResult, StoreError> {
        Ok(self.cache.query(expression)?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.cache.snapshot()
    }
}
