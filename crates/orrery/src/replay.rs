//! Loading schema and operation files and replaying them through a store.

use std::path::Path;
use std::sync::Arc;

use miette::Result;
use orrery_cache::processors::{OperationProcessor, SchemaValidationProcessor};
use orrery_cache::{CacheSettings, CacheState, MergeOptions, RecordOperation, Schema, Store};
use serde::Deserialize;
use tracing::info;

/// One item of an operations file: a lone operation or a batch applied as a
/// single transform.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TransformEntry {
    Batch(Vec<RecordOperation>),
    Single(RecordOperation),
}

impl TransformEntry {
    fn into_operations(self) -> Vec<RecordOperation> {
        match self {
            TransformEntry::Batch(operations) => operations,
            TransformEntry::Single(op) => vec![op],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Number of trailing transforms to undo.
    pub rollback: Option<usize>,
    pub fork_merge: bool,
    pub coalesce: bool,
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("failed to read {}: {}", path.display(), e))
}

pub fn load_schema(path: &Path) -> Result<Arc<Schema>> {
    let schema = Schema::from_json(&read(path)?)
        .map_err(|e| miette::miette!("invalid schema {}: {}", path.display(), e))?;
    info!(models = schema.models.len(), "loaded schema");
    Ok(Arc::new(schema))
}

pub fn load_settings(path: Option<&Path>) -> Result<CacheSettings> {
    let Some(path) = path else {
        return Ok(CacheSettings::default());
    };
    CacheSettings::from_json(&read(path)?)
        .map_err(|e| miette::miette!("invalid settings {}: {}", path.display(), e))
}

pub fn load_transforms(path: &Path) -> Result<Vec<Vec<RecordOperation>>> {
    let entries: Vec<TransformEntry> = serde_json::from_str(&read(path)?)
        .map_err(|e| miette::miette!("invalid operations file {}: {}", path.display(), e))?;
    Ok(entries.into_iter().map(TransformEntry::into_operations).collect())
}

/// Apply `transforms` to a new store, then roll back or merge as requested.
pub fn replay(
    schema: Arc<Schema>,
    settings: CacheSettings,
    transforms: Vec<Vec<RecordOperation>>,
    options: &ReplayOptions,
) -> Result<Store> {
    let mut store = Store::with_settings(schema, settings).map_err(|e| miette::miette!("{}", e))?;

    if options.fork_merge {
        let mut fork = store.fork();
        apply_all(&mut fork, transforms)?;
        let merge = MergeOptions {
            coalesce: options.coalesce,
            since_transform_id: None,
        };
        let id = store.merge(&fork, merge).map_err(|e| miette::miette!("merge failed: {}", e))?;
        info!(
            transform = %id,
            operations = store.get_transform(&id).map(|t| t.operations.len()).unwrap_or_default(),
            coalesce = options.coalesce,
            "merged fork"
        );
    } else {
        apply_all(&mut store, transforms)?;
    }

    if let Some(count) = options.rollback.filter(|count| *count > 0) {
        let entries = store.log().entries();
        if count > entries.len() {
            return Err(miette::miette!(
                "cannot roll back {} transforms, only {} logged",
                count,
                entries.len()
            ));
        }
        let oldest = entries[entries.len() - count].clone();
        store
            .rollback(&oldest, -1)
            .map_err(|e| miette::miette!("rollback failed: {}", e))?;
        info!(count, "rolled back transforms");
    }

    Ok(store)
}

fn apply_all(store: &mut Store, transforms: Vec<Vec<RecordOperation>>) -> Result<()> {
    let count = transforms.len();
    for (index, operations) in transforms.into_iter().enumerate() {
        store
            .update(operations)
            .map_err(|e| miette::miette!("transform {} failed: {}", index, e))?;
    }
    info!(transforms = count, records = store.cache().record_count(), "applied transforms");
    Ok(())
}

/// Check every operation against the schema. Returns how many were checked.
pub fn validate(schema: Arc<Schema>, transforms: &[Vec<RecordOperation>]) -> Result<usize> {
    let state = CacheState::new(schema);
    let validator = SchemaValidationProcessor::new();
    let mut checked = 0;
    for (index, operations) in transforms.iter().enumerate() {
        for op in operations {
            validator
                .validate(&state, op)
                .map_err(|e| miette::miette!("transform {}: {}", index, e))?;
            checked += 1;
        }
    }
    Ok(checked)
}

/// The store's records as pretty-printed JSON, ordered by type then id.
pub fn render(store: &Store) -> Result<String> {
    serde_json::to_string_pretty(&store.cache().all_records()).map_err(|e| miette::miette!("{}", e))
}
