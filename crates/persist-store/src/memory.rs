//! In-memory arena store
//!
//! Objects live in an arena keyed by [`ObjectId`]. The store keeps two copies
//! of the arena: the working copy every mutation goes to, and the committed
//! copy as of the last [`save`](ObjectStore::save). Fetches can target either.

use crate::predicate::PredicateSubject;
use crate::{
    FetchRequest, Model, ObjectId, ObjectStore, Primitive, RelationshipDescription, SaveRecord,
    StoreError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the memory store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Write the committed arena to this file on every save, and load it on
    /// open when it exists.
    pub snapshot_path: Option<PathBuf>,
    /// Number of save records kept in memory.
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            history_limit: 100,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Record {
    entity: String,
    attributes: BTreeMap<String, Primitive>,
    to_one: BTreeMap<String, ObjectId>,
    to_many: BTreeMap<String, Vec<ObjectId>>,
}

impl Record {
    fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            ..Default::default()
        }
    }

    /// Replace references to `from` by `to`; returns whether anything changed.
    fn repoint(&mut self, from: ObjectId, to: ObjectId) -> bool {
        let mut changed = false;
        for target in self.to_one.values_mut() {
            if *target == from {
                *target = to;
                changed = true;
            }
        }
        for members in self.to_many.values_mut() {
            if members.contains(&from) {
                let mut seen = BTreeSet::new();
                let repointed: Vec<ObjectId> = members
                    .iter()
                    .map(|m| if *m == from { to } else { *m })
                    .filter(|m| seen.insert(*m))
                    .collect();
                *members = repointed;
                changed = true;
            }
        }
        changed
    }

    /// Drop references to `object`; returns whether anything changed.
    fn nullify(&mut self, object: ObjectId) -> bool {
        let before = self.to_one.len();
        self.to_one.retain(|_, target| *target != object);
        let mut changed = before != self.to_one.len();
        for members in self.to_many.values_mut() {
            let before = members.len();
            members.retain(|m| *m != object);
            changed |= before != members.len();
        }
        changed
    }
}

impl PredicateSubject for Record {
    fn attribute_value(&self, name: &str) -> Option<&Primitive> {
        self.attributes.get(name)
    }

    fn references(&self, relationship: &str, object: ObjectId) -> bool {
        self.to_one.get(relationship) == Some(&object)
            || self
                .to_many
                .get(relationship)
                .map_or(false, |members| members.contains(&object))
    }
}

#[derive(Debug, Default)]
struct PendingChanges {
    inserted: BTreeSet<ObjectId>,
    updated: BTreeSet<ObjectId>,
    deleted: BTreeSet<ObjectId>,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    fn mark_updated(&mut self, object: ObjectId) {
        if !self.inserted.contains(&object) {
            self.updated.insert(object);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    records: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    id: ObjectId,
    record: Record,
}

// ============================================================================
// Memory Store
// ============================================================================

/// Arena-backed [`ObjectStore`].
#[derive(Debug)]
pub struct MemoryStore {
    model: Model,
    config: StoreConfig,
    working: BTreeMap<ObjectId, Record>,
    committed: BTreeMap<ObjectId, Record>,
    next_id: u64,
    pending: PendingChanges,
    history: Vec<SaveRecord>,
}

impl MemoryStore {
    /// Create an empty store for `model`.
    pub fn new(model: Model) -> Result<Self, StoreError> {
        Self::open(model, StoreConfig::default())
    }

    /// Create a store, restoring the snapshot at `config.snapshot_path` if
    /// one exists.
    pub fn open(model: Model, config: StoreConfig) -> Result<Self, StoreError> {
        model.validate()?;

        let (committed, next_id) = match &config.snapshot_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)?;
                let snapshot: Snapshot = serde_json::from_str(&contents)?;
                tracing::debug!(
                    target: "persist::store",
                    path = %path.display(),
                    objects = snapshot.records.len(),
                    "restored snapshot"
                );
                let records = snapshot
                    .records
                    .into_iter()
                    .map(|entry| (entry.id, entry.record))
                    .collect();
                (records, snapshot.next_id)
            }
            _ => (BTreeMap::new(), 0),
        };

        Ok(Self {
            model,
            config,
            working: committed.clone(),
            committed,
            next_id,
            pending: PendingChanges::default(),
            history: Vec::new(),
        })
    }

    /// Saves that committed at least one change, oldest first.
    pub fn history(&self) -> &[SaveRecord] {
        &self.history
    }

    /// Number of live objects in the working copy.
    pub fn len(&self) -> usize {
        self.working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    fn record(&self, object: ObjectId) -> Result<&Record, StoreError> {
        self.working
            .get(&object)
            .ok_or(StoreError::ObjectNotFound(object))
    }

    fn relationship_of(
        &self,
        object: ObjectId,
        name: &str,
    ) -> Result<&RelationshipDescription, StoreError> {
        let entity = &self.record(object)?.entity;
        self.model
            .relationship(entity, name)
            .ok_or_else(|| StoreError::UnknownProperty {
                entity: entity.clone(),
                property: name.to_string(),
            })
    }

    fn check_to_one(&self, object: ObjectId, name: &str) -> Result<(), StoreError> {
        let relationship = self.relationship_of(object, name)?;
        if relationship.to_many {
            return Err(StoreError::NotToOne {
                entity: self.record(object)?.entity.clone(),
                relationship: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_to_many(&self, object: ObjectId, name: &str) -> Result<(), StoreError> {
        let relationship = self.relationship_of(object, name)?;
        if !relationship.to_many {
            return Err(StoreError::NotToMany {
                entity: self.record(object)?.entity.clone(),
                relationship: name.to_string(),
            });
        }
        Ok(())
    }

    /// Targets must be live and of the relationship's destination entity.
    fn check_targets(
        &self,
        object: ObjectId,
        name: &str,
        targets: &[ObjectId],
    ) -> Result<(), StoreError> {
        let relationship = self.relationship_of(object, name)?;
        for target in targets {
            let target_entity = &self.record(*target)?.entity;
            if let Some(destination) = &relationship.destination {
                if !self.model.is_kind_of(target_entity, destination) {
                    return Err(StoreError::TypeMismatch {
                        entity: self.record(object)?.entity.clone(),
                        property: name.to_string(),
                        found: target_entity.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn record_mut(&mut self, object: ObjectId) -> Result<&mut Record, StoreError> {
        self.working
            .get_mut(&object)
            .ok_or(StoreError::ObjectNotFound(object))
    }

    /// Non-optional attributes of every inserted or updated object must hold
    /// a value.
    fn validate_pending(&self) -> Result<(), StoreError> {
        let touched = self.pending.inserted.iter().chain(&self.pending.updated);
        for object in touched {
            let Some(record) = self.working.get(object) else {
                continue;
            };
            for attribute in self.model.attributes(&record.entity) {
                if !attribute.optional && !record.attributes.contains_key(&attribute.name) {
                    return Err(StoreError::Validation {
                        entity: record.entity.clone(),
                        attribute: attribute.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn write_snapshot(&self) -> Result<(), StoreError> {
        let Some(path) = &self.config.snapshot_path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            next_id: self.next_id,
            records: self
                .working
                .iter()
                .map(|(id, record)| SnapshotEntry {
                    id: *id,
                    record: record.clone(),
                })
                .collect(),
        };
        let contents = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

impl ObjectStore for MemoryStore {
    fn model(&self) -> &Model {
        &self.model
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<ObjectId>, StoreError> {
        if !self.model.contains(&request.entity) {
            return Err(StoreError::UnknownEntity(request.entity.clone()));
        }
        let extent: BTreeSet<&str> = if request.include_subentities {
            self.model.extent(&request.entity)
        } else {
            BTreeSet::from([request.entity.as_str()])
        };
        let arena = if request.include_pending {
            &self.working
        } else {
            &self.committed
        };

        Ok(arena
            .iter()
            .filter(|(_, record)| extent.contains(record.entity.as_str()))
            .filter(|(_, record)| {
                request
                    .predicate
                    .as_ref()
                    .map_or(true, |predicate| predicate.evaluate(*record))
            })
            .map(|(id, _)| *id)
            .collect())
    }

    fn insert(&mut self, entity: &str) -> Result<ObjectId, StoreError> {
        if !self.model.contains(entity) {
            return Err(StoreError::UnknownEntity(entity.to_string()));
        }
        let id = ObjectId::new(self.next_id);
        self.next_id += 1;
        self.working.insert(id, Record::new(entity));
        self.pending.inserted.insert(id);
        tracing::trace!(target: "persist::store", %id, entity, "inserted object");
        Ok(id)
    }

    fn entity_of(&self, object: ObjectId) -> Result<&str, StoreError> {
        Ok(self.record(object)?.entity.as_str())
    }

    fn attribute(&self, object: ObjectId, name: &str) -> Result<Option<Primitive>, StoreError> {
        let record = self.record(object)?;
        if self.model.attribute(&record.entity, name).is_none() {
            return Err(StoreError::UnknownProperty {
                entity: record.entity.clone(),
                property: name.to_string(),
            });
        }
        Ok(record.attributes.get(name).cloned())
    }

    fn set_attribute(
        &mut self,
        object: ObjectId,
        name: &str,
        value: Option<Primitive>,
    ) -> Result<(), StoreError> {
        let record = self.record(object)?;
        let description = self.model.attribute(&record.entity, name).ok_or_else(|| {
            StoreError::UnknownProperty {
                entity: record.entity.clone(),
                property: name.to_string(),
            }
        })?;
        if let Some(value) = &value {
            if !description.attribute_type.accepts(value) {
                return Err(StoreError::TypeMismatch {
                    entity: record.entity.clone(),
                    property: name.to_string(),
                    found: value.kind().to_string(),
                });
            }
        }

        let record = self.record_mut(object)?;
        match value {
            Some(value) => record.attributes.insert(name.to_string(), value),
            None => record.attributes.remove(name),
        };
        self.pending.mark_updated(object);
        Ok(())
    }

    fn to_one(&self, object: ObjectId, name: &str) -> Result<Option<ObjectId>, StoreError> {
        self.check_to_one(object, name)?;
        Ok(self.record(object)?.to_one.get(name).copied())
    }

    fn set_to_one(
        &mut self,
        object: ObjectId,
        name: &str,
        target: Option<ObjectId>,
    ) -> Result<(), StoreError> {
        self.check_to_one(object, name)?;
        self.check_targets(object, name, target.as_slice())?;

        let record = self.record_mut(object)?;
        match target {
            Some(target) => record.to_one.insert(name.to_string(), target),
            None => record.to_one.remove(name),
        };
        self.pending.mark_updated(object);
        Ok(())
    }

    fn to_many(&self, object: ObjectId, name: &str) -> Result<Vec<ObjectId>, StoreError> {
        self.check_to_many(object, name)?;
        Ok(self
            .record(object)?
            .to_many
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    fn set_to_many(
        &mut self,
        object: ObjectId,
        name: &str,
        targets: Vec<ObjectId>,
    ) -> Result<(), StoreError> {
        self.check_to_many(object, name)?;
        self.check_targets(object, name, &targets)?;

        let record = self.record_mut(object)?;
        if targets.is_empty() {
            record.to_many.remove(name);
        } else {
            record.to_many.insert(name.to_string(), targets);
        }
        self.pending.mark_updated(object);
        Ok(())
    }

    fn delete(&mut self, object: ObjectId) -> Result<(), StoreError> {
        let record = self
            .working
            .remove(&object)
            .ok_or(StoreError::ObjectNotFound(object))?;

        let mut touched = Vec::new();
        for (id, other) in self.working.iter_mut() {
            if other.nullify(object) {
                touched.push(*id);
            }
        }
        for id in touched {
            self.pending.mark_updated(id);
        }

        self.pending.updated.remove(&object);
        if !self.pending.inserted.remove(&object) {
            self.pending.deleted.insert(object);
        }
        tracing::trace!(target: "persist::store", %object, entity = %record.entity, "deleted object");
        Ok(())
    }

    fn repoint(&mut self, from: ObjectId, to: ObjectId) -> Result<usize, StoreError> {
        self.record(to)?;
        let mut touched = Vec::new();
        for (id, record) in self.working.iter_mut() {
            if record.repoint(from, to) {
                touched.push(*id);
            }
        }
        for id in &touched {
            self.pending.mark_updated(*id);
        }
        Ok(touched.len())
    }

    fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn rollback(&mut self) {
        if self.has_changes() {
            tracing::debug!(target: "persist::store", "discarding pending changes");
        }
        self.working = self.committed.clone();
        self.pending = PendingChanges::default();
    }

    fn save(&mut self) -> Result<SaveRecord, StoreError> {
        self.validate_pending()?;
        self.write_snapshot()?;

        let pending = std::mem::take(&mut self.pending);
        let record = SaveRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            inserted: pending.inserted.into_iter().collect(),
            updated: pending.updated.into_iter().collect(),
            deleted: pending.deleted.into_iter().collect(),
        };
        self.committed = self.working.clone();

        if !record.is_empty() {
            tracing::debug!(
                target: "persist::store",
                inserted = record.inserted.len(),
                updated = record.updated.len(),
                deleted = record.deleted.len(),
                "committed changes"
            );
            self.history.push(record.clone());
            if self.history.len() > self.config.history_limit {
                let excess = self.history.len() - self.config.history_limit;
                self.history.drain(..excess);
            }
        }
        Ok(record)
    }
}
