//! Operation processors: hooks that validate operations and derive the
//! side-effect operations that keep the cache consistent.

mod cache_integrity;
mod schema_consistency;
mod schema_validation;

use crate::accessor::RecordAccessor;
use crate::error::{CacheResult, ValidationError};
use crate::operation::RecordOperation;

pub use cache_integrity::CacheIntegrityProcessor;
pub use schema_consistency::SchemaConsistencyProcessor;
pub use schema_validation::SchemaValidationProcessor;

/// A hook into [`RecordCache::patch`](crate::RecordCache::patch).
///
/// For every applied operation the cache calls `before`, then `after` (still
/// against the pre-mutation state), applies the operation, applies whatever
/// `after` returned, and finally calls `finally`. Operations returned from any
/// hook are applied recursively through the same pipeline.
pub trait OperationProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reject an operation before anything is mutated.
    fn validate(
        &self,
        _state: &dyn RecordAccessor,
        _op: &RecordOperation,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    fn before(
        &self,
        _state: &mut dyn RecordAccessor,
        _op: &RecordOperation,
    ) -> CacheResult<Vec<RecordOperation>> {
        Ok(Vec::new())
    }

    fn after(
        &self,
        _state: &mut dyn RecordAccessor,
        _op: &RecordOperation,
    ) -> CacheResult<Vec<RecordOperation>> {
        Ok(Vec::new())
    }

    fn finally(
        &self,
        _state: &mut dyn RecordAccessor,
        _op: &RecordOperation,
    ) -> CacheResult<Vec<RecordOperation>> {
        Ok(Vec::new())
    }

    /// Rebuild any processor-owned state after the cache is reset.
    fn reset(&self, _state: &mut dyn RecordAccessor) {}
}
