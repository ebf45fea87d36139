//! Model schema: attributes, keys and relationships per record type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::types::Record;

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    #[serde(alias = "toOne")]
    HasOne,
    #[serde(alias = "toMany")]
    HasMany,
}

/// What happens to related records when the owning record is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dependent {
    /// Remove every related record as well (recursively).
    Remove,
}

/// Declaration of one relationship on a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub kind: RelationshipKind,
    /// Target model type.
    #[serde(alias = "type")]
    pub model: String,
    /// Name of the relationship on the target model that mirrors this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent: Option<Dependent>,
}

impl RelationshipDefinition {
    pub fn has_one(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasOne,
            model: model.into(),
            inverse: None,
            dependent: None,
        }
    }

    pub fn has_many(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasMany,
            model: model.into(),
            inverse: None,
            dependent: None,
        }
    }

    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    pub fn dependent_remove(mut self) -> Self {
        self.dependent = Some(Dependent::Remove);
        self
    }

    pub fn is_dependent(&self) -> bool {
        self.dependent == Some(Dependent::Remove)
    }
}

/// Declaration of one attribute on a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Informational type name ("string", "number", ...). Not enforced.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub attribute_type: Option<String>,
}

/// Declaration of one secondary key on a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {}

/// Everything the schema knows about one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDefinition>,
    #[serde(default)]
    pub keys: BTreeMap<String, KeyDefinition>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDefinition>,
}

impl ModelDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into(), AttributeDefinition::default());
        self
    }

    pub fn with_key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into(), KeyDefinition::default());
        self
    }

    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        definition: RelationshipDefinition,
    ) -> Self {
        self.relationships.insert(name.into(), definition);
        self
    }
}

fn default_version() -> u32 {
    1
}

/// The set of model definitions a cache is consistent against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub models: BTreeMap<String, ModelDefinition>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            version: default_version(),
            models: BTreeMap::new(),
        }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, name: impl Into<String>, model: ModelDefinition) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    /// Parse a schema from JSON and check its relationship declarations.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.check()?;
        Ok(schema)
    }

    /// Check that every relationship targets a known model and that declared
    /// inverses exist on the target and point back.
    pub fn check(&self) -> Result<(), SchemaError> {
        for (type_name, model) in &self.models {
            for (name, relationship) in &model.relationships {
                let target = self.model(&relationship.model)?;
                let Some(inverse) = &relationship.inverse else {
                    continue;
                };
                let mirrored = target.relationships.get(inverse).ok_or_else(|| {
                    SchemaError::RelationshipNotFound {
                        model: relationship.model.clone(),
                        relationship: inverse.clone(),
                    }
                })?;
                if mirrored.model != *type_name || mirrored.inverse.as_deref() != Some(name) {
                    return Err(SchemaError::InverseMismatch {
                        model: type_name.clone(),
                        relationship: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn has_model(&self, type_name: &str) -> bool {
        self.models.contains_key(type_name)
    }

    pub fn model(&self, type_name: &str) -> Result<&ModelDefinition, SchemaError> {
        self.models
            .get(type_name)
            .ok_or_else(|| SchemaError::ModelNotFound(type_name.to_string()))
    }

    pub fn relationship(
        &self,
        type_name: &str,
        relationship: &str,
    ) -> Result<&RelationshipDefinition, SchemaError> {
        self.model(type_name)?
            .relationships
            .get(relationship)
            .ok_or_else(|| SchemaError::RelationshipNotFound {
                model: type_name.to_string(),
                relationship: relationship.to_string(),
            })
    }

    /// The inverse of `type_name.relationship`, as `(name, definition)` on the
    /// target model, if one is declared.
    pub fn inverse_relationship(
        &self,
        type_name: &str,
        relationship: &str,
    ) -> Result<Option<(&str, &RelationshipDefinition)>, SchemaError> {
        let definition = self.relationship(type_name, relationship)?;
        let Some(inverse) = definition.inverse.as_deref() else {
            return Ok(None);
        };
        let inverse_definition = self.relationship(&definition.model, inverse)?;
        Ok(Some((inverse, inverse_definition)))
    }

    /// Generate a fresh record id.
    pub fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Assign a generated id to a record that has none.
    pub fn initialize_record(&self, record: &mut Record) {
        if record.identity.id.is_empty() {
            record.identity.id = self.generate_id();
        }
    }
}
