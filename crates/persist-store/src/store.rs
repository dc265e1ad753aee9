//! The object store interface consumed by the reconciliation engine

use crate::{Model, Predicate, Primitive, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Core Types
// ============================================================================

/// Stable handle of a persisted object within its store.
///
/// Handles are allocated in increasing order, so ordering by `ObjectId` is
/// ordering by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A query over an entity extent.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub entity: String,
    /// Also match objects whose entity is a subentity of `entity`.
    pub include_subentities: bool,
    /// Match against uncommitted state instead of the last save.
    pub include_pending: bool,
    pub predicate: Option<Predicate>,
}

impl FetchRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            include_subentities: true,
            include_pending: true,
            predicate: None,
        }
    }

    pub fn matching(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn excluding_subentities(mut self) -> Self {
        self.include_subentities = false;
        self
    }

    pub fn excluding_pending(mut self) -> Self {
        self.include_pending = false;
        self
    }
}

/// What a single save committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub inserted: Vec<ObjectId>,
    pub updated: Vec<ObjectId>,
    pub deleted: Vec<ObjectId>,
}

impl SaveRecord {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

// ============================================================================
// Object Store Interface
// ============================================================================

/// A transactional object store with a schema.
///
/// Implementations are not required to be thread-safe internally: all calls
/// are made through a [`Context`](crate::Context), which guarantees exclusive
/// access for the duration of each call.
pub trait ObjectStore: Send + 'static {
    /// Schema the store persists against.
    fn model(&self) -> &Model;

    /// Objects matching `request`, in ascending [`ObjectId`] order.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<ObjectId>, StoreError>;

    /// Create a new, empty object of `entity`.
    fn insert(&mut self, entity: &str) -> Result<ObjectId, StoreError>;

    /// Runtime entity of an object.
    fn entity_of(&self, object: ObjectId) -> Result<&str, StoreError>;

    fn attribute(&self, object: ObjectId, name: &str) -> Result<Option<Primitive>, StoreError>;

    fn set_attribute(
        &mut self,
        object: ObjectId,
        name: &str,
        value: Option<Primitive>,
    ) -> Result<(), StoreError>;

    fn to_one(&self, object: ObjectId, name: &str) -> Result<Option<ObjectId>, StoreError>;

    fn set_to_one(
        &mut self,
        object: ObjectId,
        name: &str,
        target: Option<ObjectId>,
    ) -> Result<(), StoreError>;

    /// Members of a to-many relationship; ordered relationships keep their
    /// stored order.
    fn to_many(&self, object: ObjectId, name: &str) -> Result<Vec<ObjectId>, StoreError>;

    fn set_to_many(
        &mut self,
        object: ObjectId,
        name: &str,
        targets: Vec<ObjectId>,
    ) -> Result<(), StoreError>;

    /// Delete an object; references to it held by other objects are cleared.
    fn delete(&mut self, object: ObjectId) -> Result<(), StoreError>;

    /// Make every relationship that references `from` reference `to`
    /// instead. Returns the number of objects touched.
    fn repoint(&mut self, from: ObjectId, to: ObjectId) -> Result<usize, StoreError>;

    fn has_changes(&self) -> bool;

    /// Discard every change made since the last save.
    fn rollback(&mut self);

    /// Commit pending changes.
    fn save(&mut self) -> Result<SaveRecord, StoreError>;
}
