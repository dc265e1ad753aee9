//! Schema capability model
//!
//! Each entity taking part in reconciliation is registered with an
//! [`EntityMapping`]: which properties are persistable, which incoming key
//! each one is read from, and (optionally) which attribute identifies an
//! object. The [`Registry`] resolves entity names to their mappings.
//!
//! ```text
//! Registry
//!   ├── "Person"  ─► EntityMapping { identity: id, properties: [id, name <-> full_name] }
//!   ├── "Student" ─► EntityMapping { identity: id shared with Person, ... }
//!   └── "Address" ─► EntityMapping { identity: none (embedded), ... }
//! ```

use crate::error::{FillError, MappingError};
use crate::transform::Transformer;
use persist_store::{ObjectId, ObjectStore};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// Property Mapping
// ============================================================================

/// Pairs a local property name with the key it is read from in incoming
/// documents.
#[derive(Clone)]
pub struct PropertyMapping {
    name: String,
    key: String,
    transformer: Option<Arc<dyn Transformer>>,
}

impl PropertyMapping {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            transformer: None,
        }
    }

    /// Map a camelCase property to its snake_case key.
    pub fn snake_case(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut key = String::with_capacity(name.len() + 4);
        for (i, c) in name.chars().enumerate() {
            if c.is_uppercase() {
                if i > 0 {
                    key.push('_');
                }
                key.extend(c.to_lowercase());
            } else {
                key.push(c);
            }
        }
        Self::new(name, key)
    }

    /// Use `transformer` instead of the default one for this property.
    pub fn with_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn transformer(&self) -> Option<&dyn Transformer> {
        self.transformer.as_deref()
    }
}

/// Map `property` to incoming `key`.
pub fn map(property: impl Into<String>, key: impl Into<String>) -> PropertyMapping {
    PropertyMapping::new(property, key)
}

impl From<&str> for PropertyMapping {
    fn from(name: &str) -> Self {
        Self::new(name, name)
    }
}

impl PartialEq for PropertyMapping {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.key == other.key
    }
}

impl Eq for PropertyMapping {}

impl Hash for PropertyMapping {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Debug for PropertyMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.name, self.key)?;
        if self.transformer.is_some() {
            write!(f, " (custom transformer)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Which attribute uniquely identifies an object of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub attribute: String,
    /// Identity lookups search this superentity's extent instead of the
    /// entity's own.
    pub shared_with: Option<String>,
}

// ============================================================================
// Property Setter Hook
// ============================================================================

/// Entity-specific handling for incoming property values.
///
/// The hook runs before the default assignment; returning `Ok(true)` marks
/// the property as handled.
pub trait PropertySetter: Send + Sync {
    fn set_property(
        &self,
        store: &mut dyn ObjectStore,
        object: ObjectId,
        property: &PropertyMapping,
        value: &Value,
    ) -> Result<bool, FillError>;
}

impl<F> PropertySetter for F
where
    F: Fn(&mut dyn ObjectStore, ObjectId, &PropertyMapping, &Value) -> Result<bool, FillError>
        + Send
        + Sync,
{
    fn set_property(
        &self,
        store: &mut dyn ObjectStore,
        object: ObjectId,
        property: &PropertyMapping,
        value: &Value,
    ) -> Result<bool, FillError> {
        self(store, object, property, value)
    }
}

// ============================================================================
// Entity Mapping
// ============================================================================

/// Everything the engine needs to know about one entity.
#[derive(Clone)]
pub struct EntityMapping {
    entity: String,
    identity: Option<Identity>,
    /// Superentity requested by `sharing_identity_with`, in either order.
    shared_with: Option<String>,
    properties: Vec<PropertyMapping>,
    by_name: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
    setter: Option<Arc<dyn PropertySetter>>,
}

impl EntityMapping {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            identity: None,
            shared_with: None,
            properties: Vec::new(),
            by_name: HashMap::new(),
            by_key: HashMap::new(),
            setter: None,
        }
    }

    pub fn identified_by(mut self, attribute: impl Into<String>) -> Self {
        self.identity = Some(Identity {
            attribute: attribute.into(),
            shared_with: self.shared_with.clone(),
        });
        self
    }

    /// Share identity with `superentity`. Registration fails unless the
    /// mapping is also [`identified_by`](Self::identified_by) an attribute.
    pub fn sharing_identity_with(mut self, superentity: impl Into<String>) -> Self {
        let superentity = superentity.into();
        if let Some(identity) = &mut self.identity {
            identity.shared_with = Some(superentity.clone());
        }
        self.shared_with = Some(superentity);
        self
    }

    pub fn property(mut self, mapping: impl Into<PropertyMapping>) -> Self {
        self.properties.push(mapping.into());
        self
    }

    pub fn properties<I, P>(mut self, mappings: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PropertyMapping>,
    {
        self.properties.extend(mappings.into_iter().map(Into::into));
        self
    }

    pub fn with_setter(mut self, setter: impl PropertySetter + 'static) -> Self {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Build the lookup tables, rejecting duplicate names or keys.
    fn indexed(mut self) -> Result<Self, MappingError> {
        self.by_name.clear();
        self.by_key.clear();
        for (index, property) in self.properties.iter().enumerate() {
            if self.by_name.insert(property.name.clone(), index).is_some() {
                return Err(MappingError::DuplicateProperty {
                    entity: self.entity.clone(),
                    property: property.name.clone(),
                });
            }
            if self.by_key.insert(property.key.clone(), index).is_some() {
                return Err(MappingError::DuplicateKey {
                    entity: self.entity.clone(),
                    key: property.key.clone(),
                });
            }
        }
        if let (None, Some(superentity)) = (&self.identity, &self.shared_with) {
            return Err(MappingError::SharedIdentityWithoutIdentity {
                entity: self.entity.clone(),
                superentity: superentity.clone(),
            });
        }
        if let Some(identity) = &self.identity {
            if !self.by_name.contains_key(&identity.attribute) {
                return Err(MappingError::IdentificationPropertyNotFound {
                    entity: self.entity.clone(),
                    attribute: identity.attribute.clone(),
                });
            }
        }
        Ok(self)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_identifiable(&self) -> bool {
        self.identity.is_some()
    }

    /// Property mapping of the identity attribute.
    pub fn identification_property(&self) -> Option<&PropertyMapping> {
        let identity = self.identity.as_ref()?;
        self.by_name(&identity.attribute)
    }

    pub fn by_name(&self, name: &str) -> Option<&PropertyMapping> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    pub fn by_key(&self, key: &str) -> Option<&PropertyMapping> {
        self.by_key.get(key).map(|&i| &self.properties[i])
    }

    pub fn mapped_properties(&self) -> &[PropertyMapping] {
        &self.properties
    }

    pub fn setter(&self) -> Option<&dyn PropertySetter> {
        self.setter.as_deref()
    }
}

impl fmt::Debug for EntityMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMapping")
            .field("entity", &self.entity)
            .field("identity", &self.identity)
            .field("properties", &self.properties)
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Entity name → mapping lookup, immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: HashMap<String, EntityMapping>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, entity: &str) -> Option<&EntityMapping> {
        self.entities.get(entity)
    }

    /// Mapping for `entity`, or [`FillError::UnregisteredEntity`].
    pub fn require(&self, entity: &str) -> Result<&EntityMapping, FillError> {
        self.get(entity)
            .ok_or_else(|| FillError::UnregisteredEntity(entity.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    mappings: Vec<EntityMapping>,
}

impl RegistryBuilder {
    pub fn entity(mut self, mapping: EntityMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn build(self) -> Result<Registry, MappingError> {
        let mut entities = HashMap::new();
        for mapping in self.mappings {
            let mapping = mapping.indexed()?;
            let name = mapping.entity.clone();
            if entities.insert(name.clone(), mapping).is_some() {
                return Err(MappingError::DuplicateEntity(name));
            }
        }
        Ok(Registry { entities })
    }
}
