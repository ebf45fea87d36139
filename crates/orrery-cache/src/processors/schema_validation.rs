use crate::accessor::RecordAccessor;
use crate::error::ValidationError;
use crate::operation::{OperationKind, RecordOperation};
use crate::schema::{ModelDefinition, RelationshipDefinition, RelationshipKind};
use crate::types::{RecordIdentity, RelationshipData};

use super::OperationProcessor;

/// Rejects operations that do not fit the schema.
///
/// Attribute and key names are only checked for models that declare at least
/// one attribute (or key); a model with none accepts any.
#[derive(Debug, Default)]
pub struct SchemaValidationProcessor;

impl SchemaValidationProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl OperationProcessor for SchemaValidationProcessor {
    fn name(&self) -> &'static str {
        "schema-validation"
    }

    fn validate(
        &self,
        state: &dyn RecordAccessor,
        op: &RecordOperation,
    ) -> Result<(), ValidationError> {
        let kind = op.kind();
        let identity = op.record();
        let model = state
            .schema()
            .models
            .get(&identity.type_name)
            .ok_or_else(|| ValidationError::UnknownModel {
                op: kind,
                model: identity.type_name.clone(),
            })?;
        let check = Checker {
            kind,
            type_name: &identity.type_name,
            model,
        };

        match op {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                for name in record.attributes.keys() {
                    check.attribute(name)?;
                }
                for name in record.keys.keys() {
                    check.key(name)?;
                }
                for (name, data) in &record.relationships {
                    let definition = check.relationship(name)?;
                    match data {
                        RelationshipData::ToOne(Some(_)) => {
                            check.shape(name, definition, RelationshipKind::HasOne)?
                        }
                        RelationshipData::ToMany(set) if !set.is_empty() => {
                            check.shape(name, definition, RelationshipKind::HasMany)?
                        }
                        _ => {}
                    }
                    for related in data.members() {
                        check.related(name, definition, related)?;
                    }
                }
            }
            RecordOperation::RemoveRecord { .. } => {}
            RecordOperation::ReplaceAttribute { attribute, .. } => check.attribute(attribute)?,
            RecordOperation::ReplaceKey { key, .. } => check.key(key)?,
            RecordOperation::AddToRelatedRecords {
                relationship,
                related_record,
                ..
            }
            | RecordOperation::RemoveFromRelatedRecords {
                relationship,
                related_record,
                ..
            } => {
                let definition = check.relationship(relationship)?;
                check.shape(relationship, definition, RelationshipKind::HasMany)?;
                check.related(relationship, definition, related_record)?;
            }
            RecordOperation::ReplaceRelatedRecords {
                relationship,
                related_records,
                ..
            } => {
                let definition = check.relationship(relationship)?;
                check.shape(relationship, definition, RelationshipKind::HasMany)?;
                for related in related_records {
                    check.related(relationship, definition, related)?;
                }
            }
            RecordOperation::ReplaceRelatedRecord {
                relationship,
                related_record,
                ..
            } => {
                let definition = check.relationship(relationship)?;
                check.shape(relationship, definition, RelationshipKind::HasOne)?;
                if let Some(related) = related_record {
                    check.related(relationship, definition, related)?;
                }
            }
        }
        Ok(())
    }
}

struct Checker<'a> {
    kind: OperationKind,
    type_name: &'a str,
    model: &'a ModelDefinition,
}

impl<'a> Checker<'a> {
    fn attribute(&self, name: &str) -> Result<(), ValidationError> {
        if self.model.attributes.is_empty() || self.model.attributes.contains_key(name) {
            return Ok(());
        }
        Err(ValidationError::UnknownAttribute {
            op: self.kind,
            model: self.type_name.to_string(),
            attribute: name.to_string(),
        })
    }

    fn key(&self, name: &str) -> Result<(), ValidationError> {
        if self.model.keys.is_empty() || self.model.keys.contains_key(name) {
            return Ok(());
        }
        Err(ValidationError::UnknownKey {
            op: self.kind,
            model: self.type_name.to_string(),
            key: name.to_string(),
        })
    }

    fn relationship(&self, name: &str) -> Result<&'a RelationshipDefinition, ValidationError> {
        self.model
            .relationships
            .get(name)
            .ok_or_else(|| ValidationError::UnknownRelationship {
                op: self.kind,
                model: self.type_name.to_string(),
                relationship: name.to_string(),
            })
    }

    fn shape(
        &self,
        name: &str,
        definition: &RelationshipDefinition,
        expected: RelationshipKind,
    ) -> Result<(), ValidationError> {
        if definition.kind == expected {
            return Ok(());
        }
        Err(ValidationError::RelationshipKindMismatch {
            op: self.kind,
            model: self.type_name.to_string(),
            relationship: name.to_string(),
            kind: definition.kind,
        })
    }

    fn related(
        &self,
        name: &str,
        definition: &RelationshipDefinition,
        related: &RecordIdentity,
    ) -> Result<(), ValidationError> {
        if related.type_name == definition.model {
            return Ok(());
        }
        Err(ValidationError::RelatedTypeMismatch {
            model: self.type_name.to_string(),
            relationship: name.to_string(),
            expected: definition.model.clone(),
            related: related.clone(),
        })
    }
}
