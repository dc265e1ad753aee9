//! Orphan pruning
//!
//! Orphans are existing objects of an entity whose identity no longer appears
//! in the incoming document. Only the entity's own extent is searched, never
//! the extent of a superentity it shares identity with, and a scope predicate
//! narrows the candidates further.

use crate::error::FillError;
use crate::fill::Reconciler;
use crate::interpret::{interpret, Representation};
use crate::mapping::Registry;
use crate::transform::transform;
use persist_store::{FetchRequest, Predicate, Primitive};
use serde_json::Value;

impl<'a> Reconciler<'a> {
    /// Delete the objects of `entity` that `keeping` does not mention.
    /// Returns how many were deleted.
    pub(crate) fn prune_orphans(
        &mut self,
        entity: &str,
        keeping: &Value,
        scope: Option<&Predicate>,
    ) -> Result<usize, FillError> {
        self.ensure_entity(entity)?;
        let registry: &'a Registry = self.registry;
        let mapping = registry.require(entity)?;
        let property = mapping
            .identification_property()
            .ok_or_else(|| FillError::IdentificationPropertyNotFound(entity.to_string()))?;
        let attribute = property.name();
        let attribute_type = self
            .store
            .model()
            .attribute(entity, attribute)
            .ok_or_else(|| FillError::IdentificationAttributeNotFound {
                attribute: attribute.to_string(),
                entity: entity.to_string(),
            })?
            .attribute_type;

        let kept: Vec<Primitive> = interpret(keeping, &mut |representation| {
            let raw = match representation {
                Representation::Identity(value) => value,
                Representation::Properties(values) => values.get(property.key()).ok_or_else(|| {
                    FillError::IdentificationValueNotFound {
                        key: property.key().to_string(),
                    }
                })?,
            };
            transform(raw, attribute_type, property.transformer())?
                .ok_or_else(|| FillError::InvalidIdentificationValue(raw.clone()))
        })?;

        let mut predicate = Predicate::is_in(attribute, kept).not();
        if let Some(scope) = scope {
            predicate = predicate.and(scope.clone());
        }
        let orphans = self
            .store
            .fetch(&FetchRequest::new(entity).matching(predicate.clone()))?;

        if orphans.is_empty() {
            tracing::debug!(target: "persist::orphans", entity, %predicate, "no orphans");
            return Ok(0);
        }
        for orphan in &orphans {
            self.store.delete(*orphan)?;
        }
        tracing::debug!(
            target: "persist::orphans",
            entity,
            %predicate,
            deleted = orphans.len(),
            "deleted orphans"
        );
        Ok(orphans.len())
    }
}
