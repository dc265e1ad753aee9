//! Entity schema description
//!
//! A [`Model`] is the schema a store persists against: entities with
//! attributes and relationships, arranged in a single-inheritance hierarchy.
//! Subentities inherit every property of their superentities.

use crate::{Primitive, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Attribute Types
// ============================================================================

/// The primitive kind an attribute stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Integer16,
    Integer32,
    Integer64,
    Decimal,
    Double,
    Float,
    String,
    Boolean,
    Date,
    Binary,
    /// Opaque values (URLs and the like).
    Transformable,
    Undefined,
}

impl AttributeType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            AttributeType::Integer16 | AttributeType::Integer32 | AttributeType::Integer64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, AttributeType::Double | AttributeType::Float)
    }

    /// Inclusive bounds for integer attribute types.
    pub fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            AttributeType::Integer16 => Some((i64::from(i16::MIN), i64::from(i16::MAX))),
            AttributeType::Integer32 => Some((i64::from(i32::MIN), i64::from(i32::MAX))),
            AttributeType::Integer64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Whether an attribute of this type may hold `value`.
    pub fn accepts(self, value: &Primitive) -> bool {
        match (self, value) {
            (AttributeType::Transformable | AttributeType::Undefined, _) => true,
            (ty, Primitive::Integer(i)) if ty.is_integer() => ty
                .integer_range()
                .map_or(false, |(min, max)| (min..=max).contains(i)),
            (ty, Primitive::Double(_)) => ty.is_float(),
            (AttributeType::Decimal, Primitive::Decimal(_)) => true,
            (AttributeType::String, Primitive::String(_)) => true,
            (AttributeType::Boolean, Primitive::Boolean(_)) => true,
            (AttributeType::Date, Primitive::Date(_)) => true,
            (AttributeType::Binary, Primitive::Binary(_)) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Property Descriptions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    pub name: String,
    pub attribute_type: AttributeType,
    /// Non-optional attributes must hold a value when the store saves.
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDescription {
    pub name: String,
    /// Destination entity; a relationship without one is a schema mistake
    /// that surfaces when the relationship is first used.
    pub destination: Option<String>,
    pub to_many: bool,
    /// Only meaningful for to-many relationships.
    pub ordered: bool,
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub name: String,
    pub superentity: Option<String>,
    pub attributes: BTreeMap<String, AttributeDescription>,
    pub relationships: BTreeMap<String, RelationshipDescription>,
}

impl EntityDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superentity: None,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn subentity_of(mut self, superentity: impl Into<String>) -> Self {
        self.superentity = Some(superentity.into());
        self
    }

    /// Add an optional attribute.
    pub fn attribute(self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.with_attribute(name.into(), attribute_type, true)
    }

    /// Add an attribute that must be set before the store can save.
    pub fn required_attribute(
        self,
        name: impl Into<String>,
        attribute_type: AttributeType,
    ) -> Self {
        self.with_attribute(name.into(), attribute_type, false)
    }

    fn with_attribute(mut self, name: String, attribute_type: AttributeType, optional: bool) -> Self {
        self.attributes.insert(
            name.clone(),
            AttributeDescription {
                name,
                attribute_type,
                optional,
            },
        );
        self
    }

    pub fn to_one(self, name: impl Into<String>, destination: impl Into<String>) -> Self {
        self.with_relationship(name.into(), Some(destination.into()), false, false)
    }

    pub fn to_many(self, name: impl Into<String>, destination: impl Into<String>) -> Self {
        self.with_relationship(name.into(), Some(destination.into()), true, false)
    }

    pub fn ordered_to_many(self, name: impl Into<String>, destination: impl Into<String>) -> Self {
        self.with_relationship(name.into(), Some(destination.into()), true, true)
    }

    /// Add a relationship with a fully spelled-out description.
    pub fn relationship(mut self, relationship: RelationshipDescription) -> Self {
        self.relationships
            .insert(relationship.name.clone(), relationship);
        self
    }

    fn with_relationship(
        self,
        name: String,
        destination: Option<String>,
        to_many: bool,
        ordered: bool,
    ) -> Self {
        self.relationship(RelationshipDescription {
            name,
            destination,
            to_many,
            ordered,
        })
    }
}

// ============================================================================
// Model
// ============================================================================

/// A complete schema: every entity a store can hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    entities: BTreeMap<String, EntityDescription>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, description: EntityDescription) -> Self {
        self.entities.insert(description.name.clone(), description);
        self
    }

    /// Check that every declared superentity exists and that the hierarchy
    /// has no cycles.
    pub fn validate(&self) -> Result<(), StoreError> {
        for entity in self.entities.values() {
            let mut seen = BTreeSet::new();
            let mut current = entity;
            while let Some(superentity) = &current.superentity {
                if !seen.insert(current.name.as_str()) {
                    return Err(StoreError::CyclicHierarchy(entity.name.clone()));
                }
                current = self.entities.get(superentity).ok_or_else(|| {
                    StoreError::UnknownSuperentity {
                        entity: current.name.clone(),
                        superentity: superentity.clone(),
                    }
                })?;
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// The entity followed by its superentities, nearest first.
    pub fn ancestry(&self, name: &str) -> Vec<&EntityDescription> {
        let mut chain = Vec::new();
        let mut next = self.entities.get(name);
        while let Some(entity) = next {
            if chain.len() > self.entities.len() {
                break;
            }
            chain.push(entity);
            next = entity
                .superentity
                .as_deref()
                .and_then(|s| self.entities.get(s));
        }
        chain
    }

    /// Look up an attribute, including inherited ones.
    pub fn attribute(&self, entity: &str, name: &str) -> Option<&AttributeDescription> {
        self.ancestry(entity)
            .into_iter()
            .find_map(|e| e.attributes.get(name))
    }

    /// Look up a relationship, including inherited ones.
    pub fn relationship(&self, entity: &str, name: &str) -> Option<&RelationshipDescription> {
        self.ancestry(entity)
            .into_iter()
            .find_map(|e| e.relationships.get(name))
    }

    /// All attributes of an entity, inherited ones included.
    pub fn attributes(&self, entity: &str) -> Vec<&AttributeDescription> {
        self.ancestry(entity)
            .into_iter()
            .flat_map(|e| e.attributes.values())
            .collect()
    }

    /// All relationships of an entity, inherited ones included.
    pub fn relationships(&self, entity: &str) -> Vec<&RelationshipDescription> {
        self.ancestry(entity)
            .into_iter()
            .flat_map(|e| e.relationships.values())
            .collect()
    }

    /// Strict subentity check: `entity` inherits from `other` and is not it.
    pub fn is_subentity_of(&self, entity: &str, other: &str) -> bool {
        self.ancestry(entity)
            .into_iter()
            .skip(1)
            .any(|e| e.name == other)
    }

    /// `entity` is `other` or one of its subentities.
    pub fn is_kind_of(&self, entity: &str, other: &str) -> bool {
        entity == other || self.is_subentity_of(entity, other)
    }

    /// The entity and all of its transitive subentities.
    pub fn extent(&self, entity: &str) -> BTreeSet<&str> {
        self.entities
            .keys()
            .map(String::as_str)
            .filter(|name| self.is_kind_of(name, entity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn university() -> Model {
        Model::new()
            .entity(
                EntityDescription::new("Person")
                    .required_attribute("id", AttributeType::Integer64)
                    .attribute("name", AttributeType::String),
            )
            .entity(
                EntityDescription::new("Student")
                    .subentity_of("Person")
                    .attribute("semester", AttributeType::Integer16),
            )
            .entity(EntityDescription::new("Tutor").subentity_of("Student"))
            .entity(EntityDescription::new("Lecturer").subentity_of("Person"))
    }

    #[test]
    fn test_hierarchy_queries() {
        let model = university();
        assert!(model.validate().is_ok());
        assert!(model.is_subentity_of("Tutor", "Person"));
        assert!(model.is_subentity_of("Student", "Person"));
        assert!(!model.is_subentity_of("Person", "Person"));
        assert!(model.is_kind_of("Person", "Person"));
        assert!(!model.is_kind_of("Lecturer", "Student"));

        let extent = model.extent("Student");
        assert_eq!(extent.into_iter().collect::<Vec<_>>(), vec!["Student", "Tutor"]);
    }

    #[test]
    fn test_inherited_properties() {
        let model = university();
        let id = model.attribute("Tutor", "id").expect("inherited id");
        assert_eq!(id.attribute_type, AttributeType::Integer64);
        assert!(!id.optional);
        assert!(model.attribute("Person", "semester").is_none());
        assert_eq!(model.attributes("Tutor").len(), 3);
    }

    #[test]
    fn test_validate_rejects_unknown_superentity() {
        let model = Model::new().entity(EntityDescription::new("Orphan").subentity_of("Nobody"));
        assert!(matches!(
            model.validate(),
            Err(StoreError::UnknownSuperentity { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_cycles() {
        let model = Model::new()
            .entity(EntityDescription::new("A").subentity_of("B"))
            .entity(EntityDescription::new("B").subentity_of("A"));
        assert!(matches!(
            model.validate(),
            Err(StoreError::CyclicHierarchy(_))
        ));
    }

    #[test]
    fn test_attribute_type_accepts() {
        assert!(AttributeType::Integer16.accepts(&Primitive::Integer(100)));
        assert!(!AttributeType::Integer16.accepts(&Primitive::Integer(70_000)));
        assert!(AttributeType::Float.accepts(&Primitive::Double(1.5)));
        assert!(!AttributeType::String.accepts(&Primitive::Integer(1)));
        assert!(AttributeType::Transformable.accepts(&Primitive::from("anything")));
    }
}
