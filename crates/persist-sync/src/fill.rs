//! Graph filler
//!
//! Walks an incoming document and brings the object graph in line with it.
//! Objects are found or created through identity resolution, then every
//! mapped property present in the document is assigned. Nothing is written
//! when the stored value already equals the incoming one, so reconciling the
//! same document twice leaves the store without pending changes.

use crate::error::{FillError, Recover};
use crate::interpret::{interpret, Representation};
use crate::mapping::{EntityMapping, PropertyMapping, Registry};
use crate::transform::transform;
use persist_store::{ObjectId, ObjectStore, RelationshipDescription};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

// ============================================================================
// Reconciler
// ============================================================================

/// One pass of reconciliation against a store the caller has exclusive
/// access to.
///
/// Identity resolution lives in `stub.rs` and orphan pruning in `orphans.rs`;
/// both extend this type.
pub(crate) struct Reconciler<'a> {
    pub(crate) store: &'a mut dyn ObjectStore,
    pub(crate) registry: &'a Registry,
    /// Retired object → the object that replaced it on promotion.
    pub(crate) promoted: HashMap<ObjectId, ObjectId>,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(store: &'a mut dyn ObjectStore, registry: &'a Registry) -> Self {
        Self {
            store,
            registry,
            promoted: HashMap::new(),
        }
    }

    /// Follow promotions so a handle never names a retired object.
    pub(crate) fn resolve(&self, mut object: ObjectId) -> ObjectId {
        while let Some(&next) = self.promoted.get(&object) {
            object = next;
        }
        object
    }

    pub(crate) fn ensure_entity(&self, entity: &str) -> Result<(), FillError> {
        if self.store.model().contains(entity) {
            Ok(())
        } else {
            Err(FillError::UnknownEntity(entity.to_string()))
        }
    }

    /// Mapping of the object's runtime entity when it has one of its own.
    fn mapping_for(
        &self,
        object: ObjectId,
        fallback: &'a EntityMapping,
    ) -> Result<&'a EntityMapping, FillError> {
        let registry: &'a Registry = self.registry;
        let entity = self.store.entity_of(object)?;
        Ok(registry.get(entity).unwrap_or(fallback))
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Reconcile `value` as objects of `entity`.
    pub(crate) fn fill(&mut self, entity: &str, value: &Value) -> Result<Vec<ObjectId>, FillError> {
        self.ensure_entity(entity)?;
        let registry: &'a Registry = self.registry;
        let mapping = registry.require(entity)?;

        let objects = interpret(value, &mut |representation| match representation {
            Representation::Identity(identity) => {
                if !mapping.is_identifiable() {
                    return Err(FillError::NonIdentifiableType(entity.to_string()));
                }
                self.stub(entity, identity)
            }
            Representation::Properties(values) => self.fill_object(entity, mapping, values),
        })?;

        Ok(objects.into_iter().map(|object| self.resolve(object)).collect())
    }

    fn fill_object(
        &mut self,
        entity: &str,
        mapping: &'a EntityMapping,
        values: &Map<String, Value>,
    ) -> Result<ObjectId, FillError> {
        let object = match mapping.identification_property() {
            Some(property) => {
                let identity = values.get(property.key()).ok_or_else(|| {
                    FillError::IdentificationValueNotFound {
                        key: property.key().to_string(),
                    }
                })?;
                self.stub(entity, identity)?
            }
            None => {
                let object = self.store.insert(entity)?;
                tracing::debug!(target: "persist::fill", %object, entity, "created unidentified object");
                object
            }
        };

        let mapping = self.mapping_for(object, mapping)?;
        self.fill_properties(object, mapping, values)?;
        Ok(self.resolve(object))
    }

    /// Assign every mapped property present in `values`.
    ///
    /// Data errors skip the property; anything else stops the fill.
    pub(crate) fn fill_properties(
        &mut self,
        object: ObjectId,
        mapping: &'a EntityMapping,
        values: &Map<String, Value>,
    ) -> Result<(), FillError> {
        let entity = self.store.entity_of(object)?.to_string();
        for (key, value) in values {
            let Some(property) = mapping.by_key(key) else {
                tracing::trace!(target: "persist::fill", entity = %entity, key = %key, "skipping unmapped key");
                continue;
            };
            // the object may have been promoted by an earlier property
            let object = self.resolve(object);
            self.set_property(object, &entity, mapping, property, value)
                .recover(|err| {
                    tracing::warn!(
                        target: "persist::fill",
                        entity = %entity,
                        property = property.name(),
                        error = %err,
                        "skipping property"
                    )
                })?;
        }
        Ok(())
    }

    // ========================================================================
    // Properties
    // ========================================================================

    fn set_property(
        &mut self,
        object: ObjectId,
        entity: &str,
        mapping: &EntityMapping,
        property: &PropertyMapping,
        value: &Value,
    ) -> Result<(), FillError> {
        if let Some(setter) = mapping.setter() {
            if setter.set_property(&mut *self.store, object, property, value)? {
                return Ok(());
            }
        }

        let name = property.name();
        let model = self.store.model();
        if let Some(attribute) = model.attribute(entity, name) {
            let target = attribute.attribute_type;
            let incoming = transform(value, target, property.transformer())?;
            if self.store.attribute(object, name)? == incoming {
                return Ok(());
            }
            tracing::trace!(target: "persist::fill", %object, attribute = name, "writing attribute");
            self.store.set_attribute(object, name, incoming)?;
            return Ok(());
        }

        let relationship = model
            .relationship(entity, name)
            .cloned()
            .ok_or_else(|| FillError::PropertyNotFound(name.to_string()))?;
        self.set_relationship(object, &relationship, value)
    }

    fn set_relationship(
        &mut self,
        object: ObjectId,
        relationship: &RelationshipDescription,
        value: &Value,
    ) -> Result<(), FillError> {
        let name = relationship.name.as_str();
        let destination = relationship
            .destination
            .as_deref()
            .ok_or_else(|| FillError::MissingDestinationEntity(name.to_string()))?;
        self.ensure_entity(destination)?;
        let registry: &'a Registry = self.registry;
        let destination_mapping = registry.require(destination)?;

        if !destination_mapping.is_identifiable() && !relationship.to_many {
            return self.set_embedded(object, name, destination, destination_mapping, value);
        }

        let targets = self.fill(destination, value)?;
        let object = self.resolve(object);

        if relationship.to_many {
            let mut seen = BTreeSet::new();
            let targets: Vec<ObjectId> = targets.into_iter().filter(|t| seen.insert(*t)).collect();
            let current = self.store.to_many(object, name)?;
            let unchanged = if relationship.ordered {
                current == targets
            } else {
                current.iter().copied().collect::<BTreeSet<_>>() == seen
            };
            if !unchanged {
                tracing::trace!(target: "persist::fill", %object, relationship = name, count = targets.len(), "replacing members");
                self.store.set_to_many(object, name, targets)?;
            }
            return Ok(());
        }

        if targets.len() > 1 {
            return Err(FillError::TooManyValues(name.to_string()));
        }
        let target = targets.first().copied();
        if self.store.to_one(object, name)? != target {
            tracing::trace!(target: "persist::fill", %object, relationship = name, "writing to-one");
            self.store.set_to_one(object, name, target)?;
        }
        Ok(())
    }

    /// To-one relationship to an entity without identity: the destination is
    /// part of its owner and updated in place.
    fn set_embedded(
        &mut self,
        object: ObjectId,
        name: &str,
        destination: &str,
        mapping: &'a EntityMapping,
        value: &Value,
    ) -> Result<(), FillError> {
        let representations = interpret(value, &mut |representation| match representation {
            Representation::Properties(values) => Ok(values),
            Representation::Identity(_) => Err(FillError::NonIdentifiableType(destination.to_string())),
        })?;
        let current = self.store.to_one(object, name)?;

        match representations.as_slice() {
            [] => {
                if current.is_some() {
                    tracing::trace!(target: "persist::fill", %object, relationship = name, "clearing embedded object");
                    self.store.set_to_one(object, name, None)?;
                }
                Ok(())
            }
            [values] => {
                let reusable = match current {
                    Some(existing) => self.is_kind_of(existing, destination)?.then_some(existing),
                    None => None,
                };
                let target = match reusable {
                    Some(existing) => existing,
                    None => {
                        let created = self.store.insert(destination)?;
                        self.store.set_to_one(object, name, Some(created))?;
                        tracing::debug!(target: "persist::fill", %object, relationship = name, %created, "created embedded object");
                        created
                    }
                };
                let mapping = self.mapping_for(target, mapping)?;
                self.fill_properties(target, mapping, values)
            }
            _ => Err(FillError::TooManyValues(name.to_string())),
        }
    }

    fn is_kind_of(&self, object: ObjectId, entity: &str) -> Result<bool, FillError> {
        let runtime = self.store.entity_of(object)?;
        Ok(self.store.model().is_kind_of(runtime, entity))
    }
}
