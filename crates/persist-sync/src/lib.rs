//! Persist Sync: JSON → object graph reconciliation
//!
//! Brings a persisted object graph in line with an incoming JSON document:
//! objects are found or created by identity, attributes and relationships are
//! written only when they differ, and objects missing from the document are
//! deleted within a scope.
//!
//! ```text
//! ┌───────────────┐    ┌──────────────────────────────────────────────┐
//! │ JSON document │───►│ Persist::reconcile                           │
//! └───────────────┘    │   ChangeQueue   one batch at a time          │
//!                      │   ├── prune orphans  (orphans.rs)            │
//!                      │   ├── fill           (fill.rs)               │
//!                      │   │    ├── stub      (stub.rs, promotion)    │
//!                      │   │    └── transform (transform.rs)          │
//!                      │   └── save, or roll back on failure          │
//!                      └──────────────┬───────────────────────────────┘
//!                                     ▼
//!                           Context<S: ObjectStore>
//! ```
//!
//! Entities take part through an [`EntityMapping`] registered in a
//! [`Registry`]:
//!
//! ```ignore
//! let registry = Registry::builder()
//!     .entity(
//!         EntityMapping::new("Person")
//!             .identified_by("id")
//!             .properties(["id", "name"])
//!             .property(map("homepage", "url").with_transformer(UrlTransformer)),
//!     )
//!     .build()?;
//!
//! let persist = Persist::new(Context::new(store), registry);
//! let outcome = persist.reconcile(json!([{"id": 1, "name": "Ada"}]), "Person", None).await?;
//! ```

pub mod config;
pub mod error;
mod fill;
pub mod interpret;
pub mod mapping;
mod orphans;
pub mod persist;
mod stub;
pub mod transform;

pub use config::PersistConfig;
pub use error::{ErrorKind, FillError, MappingError, PersistError, TransformError};
pub use interpret::{interpret, Representation};
pub use mapping::{
    map, EntityMapping, Identity, PropertyMapping, PropertySetter, Registry, RegistryBuilder,
};
pub use persist::{Persist, PersistEvent, PersistEventHandler, Reconciliation};
pub use transform::{
    parse_iso8601, transform, FormattedDateTransformer, FormattedNumberTransformer,
    IdentityTransformer, Iso8601DateTransformer, NumberFormatTransformer, Transformer,
    UrlTransformer, ISO8601_FORMAT,
};

pub use persist_store::{
    ChangeQueue, Context, ObjectId, ObjectStore, Predicate, Primitive, SaveRecord,
};
