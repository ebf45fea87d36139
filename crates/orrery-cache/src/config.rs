//! Cache settings.

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Default bound on how deep processor-derived operations may nest. Cascades
/// run on a heap-allocated work stack, so this only guards against processors
/// that never stop deriving operations.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 1 << 16;

/// Default capacity of the cache event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Tunables for a [`RecordCache`](crate::RecordCache). Every field has a
/// default, so `{}` is a valid settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// How deep processor-derived operations may nest before `patch` fails.
    pub max_cascade_depth: usize,
    /// Capacity of the broadcast channel for cache events. Slow subscribers
    /// that fall further behind than this lose events.
    pub event_capacity: usize,
    /// Check operations against the schema before applying them.
    pub validate_operations: bool,
    /// Maintain declared inverse relationships and dependent removal.
    pub schema_consistency: bool,
    /// Maintain the reverse-relationship index and detach removed records.
    pub cache_integrity: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            validate_operations: true,
            schema_consistency: true,
            cache_integrity: true,
        }
    }
}

impl CacheSettings {
    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: CacheSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_cascade_depth == 0 {
            return Err(SettingsError::Invalid(
                "max_cascade_depth must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(SettingsError::Invalid(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_operations = enabled;
        self
    }

    pub fn with_schema_consistency(mut self, enabled: bool) -> Self {
        self.schema_consistency = enabled;
        self
    }

    pub fn with_cache_integrity(mut self, enabled: bool) -> Self {
        self.cache_integrity = enabled;
        self
    }
}
