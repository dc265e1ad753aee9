//! Persist Store: the persistence-session boundary
//!
//! The reconciliation engine never talks to a database directly. Everything it
//! needs from a persistence engine goes through the [`ObjectStore`] trait,
//! executed on a confined [`Context`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Context<S>                             │
//! │   (confined: one operation on the store at a time)           │
//! │                                                              │
//! │   enqueue(work)  ──► ChangeQueue (one unit at a time)        │
//! │   perform(|store| ...) ──► ObjectStore                       │
//! │                             ├── Model      (schema)          │
//! │                             ├── fetch      (Predicate)       │
//! │                             ├── insert / delete / repoint    │
//! │                             ├── attribute / relationship I/O │
//! │                             └── save / rollback              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`MemoryStore`] is an arena-backed implementation: records are addressed by
//! a stable [`ObjectId`], pending changes are tracked against the last
//! committed snapshot, and commits can optionally be written to a JSON file.

pub mod context;
pub mod error;
pub mod memory;
pub mod model;
pub mod predicate;
pub mod primitive;
pub mod queue;
pub mod store;

#[cfg(test)]
mod tests;

pub use context::Context;
pub use error::StoreError;
pub use memory::{MemoryStore, StoreConfig};
pub use model::{
    AttributeDescription, AttributeType, EntityDescription, Model, RelationshipDescription,
};
pub use predicate::{Predicate, PredicateSubject};
pub use primitive::Primitive;
pub use queue::ChangeQueue;
pub use store::{FetchRequest, ObjectId, ObjectStore, SaveRecord};
