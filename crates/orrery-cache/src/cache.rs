//! The record cache: a schema-aware, relationally consistent store of records
//! mutated only through [`RecordOperation`]s.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::accessor::{CacheState, InverseRelationship, RecordAccessor};
use crate::config::CacheSettings;
use crate::error::{CacheError, CacheResult, SettingsError};
use crate::operation::RecordOperation;
use crate::processors::{
    CacheIntegrityProcessor, OperationProcessor, SchemaConsistencyProcessor,
    SchemaValidationProcessor,
};
use crate::query::{self, QueryExpression, QueryResult};
use crate::schema::{RelationshipKind, Schema};
use crate::transforms;
use crate::types::{Record, RecordIdentity};

/// Notification emitted for every operation that changed the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// An operation (primary or processor-derived) was applied.
    Patch(RecordOperation),
    /// The cache was cleared.
    Reset,
}

/// An immutable view of the cache at one point in time.
///
/// Holds the same persistent maps as the cache it came from, so taking one is
/// cheap and later patches to the cache never show through.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    state: CacheState,
}

impl CacheSnapshot {
    pub fn get_record(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.state.get_record(identity)
    }

    pub fn records_of_type(&self, type_name: &str) -> Vec<&Record> {
        self.state.records_of_type(type_name)
    }

    pub fn all_records(&self) -> Vec<&Record> {
        self.state.all_records()
    }

    pub fn record_count(&self) -> usize {
        self.state.record_count()
    }

    pub fn inverse_relationships(&self, identity: &RecordIdentity) -> Vec<InverseRelationship> {
        self.state.inverse_relationships(identity)
    }

    pub fn query(&self, expression: &QueryExpression) -> CacheResult<QueryResult> {
        query::query(&self.state, expression)
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }
}

type Processors = Arc<[Arc<dyn OperationProcessor>]>;

/// A normalized, relationally consistent record cache.
///
/// Every mutation goes through [`RecordCache::patch`], which runs the
/// operation processor pipeline and returns the inverse operations.
pub struct RecordCache {
    state: CacheState,
    processors: Processors,
    settings: CacheSettings,
    events_tx: broadcast::Sender<CacheEvent>,
    poisoned: bool,
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("records", &self.state.record_count())
            .field(
                "processors",
                &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("settings", &self.settings)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl RecordCache {
    /// Create an empty cache with default settings.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::build(schema, CacheSettings::default())
    }

    /// Create an empty cache, rejecting invalid settings.
    pub fn with_settings(
        schema: Arc<Schema>,
        settings: CacheSettings,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self::build(schema, settings))
    }

    fn build(schema: Arc<Schema>, settings: CacheSettings) -> Self {
        let mut processors: Vec<Arc<dyn OperationProcessor>> = Vec::new();
        if settings.validate_operations {
            processors.push(Arc::new(SchemaValidationProcessor::new()));
        }
        if settings.schema_consistency {
            processors.push(Arc::new(SchemaConsistencyProcessor::new()));
        }
        if settings.cache_integrity {
            processors.push(Arc::new(CacheIntegrityProcessor::new()));
        }
        let (events_tx, _) = broadcast::channel(settings.event_capacity);
        Self {
            state: CacheState::new(schema),
            processors: processors.into(),
            settings,
            events_tx,
            poisoned: false,
        }
    }

    pub fn schema(&self) -> &Schema {
        self.state.schema()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Subscribe to cache events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events_tx.subscribe()
    }

    fn broadcast(&self, event: CacheEvent) {
        if self.events_tx.send(event).is_err() {
            trace!("no subscribers for cache event");
        }
    }

    pub fn get_record(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.state.get_record(identity)
    }

    pub fn records_of_type(&self, type_name: &str) -> Vec<&Record> {
        self.state.records_of_type(type_name)
    }

    pub fn all_records(&self) -> Vec<&Record> {
        self.state.all_records()
    }

    pub fn record_count(&self) -> usize {
        self.state.record_count()
    }

    pub fn inverse_relationships(&self, identity: &RecordIdentity) -> Vec<InverseRelationship> {
        self.state.inverse_relationships(identity)
    }

    pub fn query(&self, expression: &QueryExpression) -> CacheResult<QueryResult> {
        query::query(&self.state, expression)
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            state: self.state.clone(),
        }
    }

    /// An independent cache that starts out sharing this cache's maps.
    pub fn fork(&self) -> Self {
        let (events_tx, _) = broadcast::channel(self.settings.event_capacity);
        Self {
            state: self.state.clone(),
            processors: Arc::clone(&self.processors),
            settings: self.settings.clone(),
            events_tx,
            poisoned: self.poisoned,
        }
    }

    /// Clear every record and let processors rebuild their state. Also clears
    /// a poisoned cache.
    pub fn reset(&mut self) {
        self.state = CacheState::new(Arc::clone(self.state.schema_arc()));
        for processor in self.processors.iter() {
            processor.reset(&mut self.state);
        }
        self.poisoned = false;
        trace!("cache reset");
        self.broadcast(CacheEvent::Reset);
    }

    /// Apply `operations` in order and return the operations that undo them,
    /// in the order they must be applied.
    ///
    /// Every operation is validated by every processor before anything is
    /// mutated; a validation failure leaves the cache untouched. A failure
    /// while applying leaves the cache poisoned until [`RecordCache::reset`].
    pub fn patch(&mut self, operations: &[RecordOperation]) -> CacheResult<Vec<RecordOperation>> {
        if self.poisoned {
            return Err(CacheError::Poisoned);
        }
        for op in operations {
            for processor in self.processors.iter() {
                processor.validate(&self.state, op)?;
            }
        }

        let mut inverse = Vec::new();
        for op in operations {
            if let Err(err) = self.apply_operation(op, &mut inverse) {
                warn!(
                    error = %err,
                    op = %op.kind(),
                    record = %op.record(),
                    "patch failed, cache poisoned"
                );
                self.poisoned = true;
                return Err(err);
            }
        }
        inverse.reverse();
        Ok(detach_dependents(self.state.schema(), inverse))
    }

    /// Run `op` and everything the processors derive from it, depth first.
    ///
    /// Derived operations are queued on an explicit stack rather than the call
    /// stack, so arbitrarily long cascades cannot overflow it.
    fn apply_operation(
        &mut self,
        op: &RecordOperation,
        inverse: &mut Vec<RecordOperation>,
    ) -> CacheResult<()> {
        let processors = Arc::clone(&self.processors);
        let mut steps = vec![Step::Start {
            op: op.clone(),
            depth: 0,
        }];

        while let Some(step) = steps.pop() {
            match step {
                Step::Start { op, depth } => {
                    let Some(undo) = transforms::inverse_operation(&self.state, &op) else {
                        trace!(op = %op.kind(), record = %op.record(), "no-op");
                        continue;
                    };
                    if depth > self.settings.max_cascade_depth {
                        return Err(CacheError::CascadeDepthExceeded {
                            depth,
                            op: op.kind(),
                            record: op.record().clone(),
                        });
                    }
                    // pushed before the removal so they follow it once reversed
                    if matches!(undo, RecordOperation::RemoveRecord { .. }) {
                        inverse.extend(relink_holders(&self.state, op.record()));
                    }
                    inverse.push(undo);
                    steps.push(Step::Before {
                        op,
                        depth,
                        processor: 0,
                    });
                }
                Step::Before { op, depth, processor } => {
                    let Some(current) = processors.get(processor) else {
                        steps.push(Step::Mutate { op, depth });
                        continue;
                    };
                    let derived = current.before(&mut self.state, &op)?;
                    steps.push(Step::Before {
                        op,
                        depth,
                        processor: processor + 1,
                    });
                    push_derived(&mut steps, derived, depth + 1);
                }
                Step::Mutate { op, depth } => {
                    let mut after = Vec::new();
                    for processor in processors.iter() {
                        after.extend(processor.after(&mut self.state, &op)?);
                    }

                    if transforms::apply_patch(&mut self.state, &op) {
                        trace!(op = %op.kind(), record = %op.record(), depth, "applied");
                        self.broadcast(CacheEvent::Patch(op.clone()));
                    }

                    steps.push(Step::Finally {
                        op,
                        depth,
                        processor: 0,
                    });
                    push_derived(&mut steps, after, depth + 1);
                }
                Step::Finally { op, depth, processor } => {
                    let Some(current) = processors.get(processor) else {
                        continue;
                    };
                    let derived = current.finally(&mut self.state, &op)?;
                    steps.push(Step::Finally {
                        op,
                        depth,
                        processor: processor + 1,
                    });
                    push_derived(&mut steps, derived, depth + 1);
                }
            }
        }
        Ok(())
    }
}

/// Pending work while applying one operation and its cascade.
enum Step {
    /// Compute the inverse, then run the `before` hooks.
    Start { op: RecordOperation, depth: usize },
    /// Run the `before` hook of the processor at this index, then its
    /// derived operations, then move on to the next processor.
    Before {
        op: RecordOperation,
        depth: usize,
        processor: usize,
    },
    /// Collect `after` operations, mutate, then run them.
    Mutate { op: RecordOperation, depth: usize },
    /// Run the `finally` hook of the processor at this index.
    Finally {
        op: RecordOperation,
        depth: usize,
        processor: usize,
    },
}

/// Queue `derived` so the first of them is popped next.
fn push_derived(steps: &mut Vec<Step>, derived: Vec<RecordOperation>, depth: usize) {
    steps.extend(derived.into_iter().rev().map(|op| Step::Start { op, depth }));
}

/// Records that reference `identity` while it does not exist yet. Undoing its
/// creation detaches them, so the undo must link them again.
fn relink_holders(state: &CacheState, identity: &RecordIdentity) -> Vec<RecordOperation> {
    let mut ops = Vec::new();
    for holder in state.inverse_relationships(identity) {
        let Some(record) = state.get_record(&holder.record) else {
            continue;
        };
        if record.related_record(&holder.relationship) == Some(identity) {
            ops.push(RecordOperation::replace_related_record(
                holder.record,
                holder.relationship,
                Some(identity.clone()),
            ));
        } else if record.references(&holder.relationship, identity) {
            ops.push(RecordOperation::add_to_related_records(
                holder.record,
                holder.relationship,
                identity.clone(),
            ));
        }
    }
    ops
}

/// Every `removeRecord` in an inverse list undoes the creation of a record.
/// That removal must not cascade: dependents created in the same patch carry
/// their own removal, and dependents that existed before must survive. Detach
/// the dependent relationships right before each such removal.
fn detach_dependents(schema: &Schema, inverse: Vec<RecordOperation>) -> Vec<RecordOperation> {
    let mut ops = Vec::with_capacity(inverse.len());
    for op in inverse {
        if let RecordOperation::RemoveRecord { record } = &op {
            let dependents = schema
                .model(&record.type_name)
                .into_iter()
                .flat_map(|model| model.relationships.iter())
                .filter(|(_, definition)| definition.is_dependent());
            for (name, definition) in dependents {
                ops.push(match definition.kind {
                    RelationshipKind::HasMany => {
                        RecordOperation::replace_related_records(record.clone(), name.clone(), [])
                    }
                    RelationshipKind::HasOne => {
                        RecordOperation::replace_related_record(record.clone(), name.clone(), None)
                    }
                });
            }
        }
        ops.push(op);
    }
    ops
}
