//! Identity resolution ("stubbing")
//!
//! Finds the object an identity value names, or creates a minimal one. When
//! an entity shares identity with a superentity, the lookup searches the
//! superentity's whole extent:
//!
//! ```text
//!            Person (id)            lookup Student #7 searches Person's extent
//!           /       \
//!      Student    Lecturer          found Person #7   ─► promote to Student
//!         |                         found Tutor #7    ─► keep (already a Student)
//!       Tutor                       found Lecturer #7 ─► NotSubentity
//! ```
//!
//! Promotion allocates an object of the refined entity, copies every property
//! value, repoints inbound references and retires the original. The retired
//! handle is remembered so later lookups in the same pass resolve to the
//! replacement.

use crate::error::FillError;
use crate::fill::Reconciler;
use crate::mapping::Registry;
use crate::transform::transform;
use persist_store::{FetchRequest, ObjectId, Predicate};
use serde_json::Value;

impl<'a> Reconciler<'a> {
    /// Find or create the object of `entity` identified by `identity`.
    pub(crate) fn stub(&mut self, entity: &str, identity: &Value) -> Result<ObjectId, FillError> {
        self.ensure_entity(entity)?;
        let registry: &'a Registry = self.registry;
        let mapping = registry.require(entity)?;
        let declared = mapping
            .identity()
            .ok_or_else(|| FillError::IdentificationPropertyNotFound(entity.to_string()))?;
        let property = mapping
            .identification_property()
            .ok_or_else(|| FillError::IdentificationPropertyNotFound(entity.to_string()))?;

        let model = self.store.model();
        let attribute_type = model
            .attribute(entity, &declared.attribute)
            .ok_or_else(|| FillError::IdentificationAttributeNotFound {
                attribute: declared.attribute.clone(),
                entity: entity.to_string(),
            })?
            .attribute_type;

        let scope = match declared.shared_with.as_deref() {
            Some(superentity) if model.is_kind_of(entity, superentity) => superentity,
            Some(superentity) => {
                return Err(FillError::NotSubentity {
                    entity: entity.to_string(),
                    superentity: superentity.to_string(),
                })
            }
            None => entity,
        };

        let key = transform(identity, attribute_type, property.transformer())
            .ok()
            .flatten()
            .ok_or_else(|| FillError::InvalidIdentificationValue(identity.clone()))?;

        let request = FetchRequest::new(scope)
            .matching(Predicate::eq(declared.attribute.as_str(), key.clone()));
        let matches = self.store.fetch(&request)?;

        let found = match matches.as_slice() {
            [] => {
                let object = self.store.insert(entity)?;
                self.store
                    .set_attribute(object, &declared.attribute, Some(key))?;
                tracing::debug!(target: "persist::stub", %object, entity, "created stub");
                return Ok(object);
            }
            [only] => *only,
            [first, ..] => {
                tracing::warn!(
                    target: "persist::stub",
                    entity,
                    scope,
                    identity = %key,
                    count = matches.len(),
                    chosen = %first,
                    "identity matches more than one object"
                );
                *first
            }
        };

        let runtime = self.store.entity_of(found)?;
        let model = self.store.model();
        if model.is_kind_of(runtime, entity) {
            return Ok(found);
        }
        if model.is_subentity_of(entity, runtime) {
            return self.promote(found, entity);
        }
        Err(FillError::NotSubentity {
            entity: entity.to_string(),
            superentity: runtime.to_string(),
        })
    }

    /// Replace `object` by a new object of `entity`, a strict subentity of
    /// its current entity.
    fn promote(&mut self, object: ObjectId, entity: &str) -> Result<ObjectId, FillError> {
        let current = self.store.entity_of(object)?.to_string();
        let model = self.store.model();
        let attributes: Vec<String> = model
            .attributes(&current)
            .into_iter()
            .map(|a| a.name.clone())
            .collect();
        let relationships: Vec<(String, bool)> = model
            .relationships(&current)
            .into_iter()
            .map(|r| (r.name.clone(), r.to_many))
            .collect();

        let replacement = self.store.insert(entity)?;
        for name in &attributes {
            if let Some(value) = self.store.attribute(object, name)? {
                self.store.set_attribute(replacement, name, Some(value))?;
            }
        }
        for (name, to_many) in &relationships {
            if *to_many {
                let members = self.store.to_many(object, name)?;
                if !members.is_empty() {
                    self.store.set_to_many(replacement, name, members)?;
                }
            } else if let Some(target) = self.store.to_one(object, name)? {
                self.store.set_to_one(replacement, name, Some(target))?;
            }
        }

        let repointed = self.store.repoint(object, replacement)?;
        self.store.delete(object)?;
        self.promoted.insert(object, replacement);

        tracing::debug!(
            target: "persist::stub",
            from = %object,
            to = %replacement,
            from_entity = %current,
            to_entity = entity,
            repointed,
            "promoted object"
        );
        Ok(replacement)
    }
}
