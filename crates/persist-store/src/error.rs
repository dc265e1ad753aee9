use crate::ObjectId;

/// Errors raised by an [`ObjectStore`](crate::ObjectStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown entity {0}")]
    UnknownEntity(String),
    #[error("entity {entity} has no property {property}")]
    UnknownProperty { entity: String, property: String },
    #[error("entity {entity} declares superentity {superentity}, which is not in the model")]
    UnknownSuperentity { entity: String, superentity: String },
    #[error("entity hierarchy of {0} is cyclic")]
    CyclicHierarchy(String),
    #[error("object {0} not found, was it deleted from its context?")]
    ObjectNotFound(ObjectId),
    #[error("relationship {relationship} of {entity} is to-many")]
    NotToOne { entity: String, relationship: String },
    #[error("relationship {relationship} of {entity} is to-one")]
    NotToMany { entity: String, relationship: String },
    #[error("property {property} of {entity} cannot hold {found}")]
    TypeMismatch {
        entity: String,
        property: String,
        found: String,
    },
    #[error("validation failed: {entity}.{attribute} is required")]
    Validation { entity: String, attribute: String },
    #[error("batch aborted: {0}")]
    BatchAborted(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the error points at a schema/model mistake rather than a
    /// failing store.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownEntity(_)
                | StoreError::UnknownProperty { .. }
                | StoreError::UnknownSuperentity { .. }
                | StoreError::CyclicHierarchy(_)
                | StoreError::NotToOne { .. }
                | StoreError::NotToMany { .. }
        )
    }

    /// Whether the store rejected a value the incoming data supplied.
    pub fn is_data(&self) -> bool {
        matches!(self, StoreError::TypeMismatch { .. })
    }
}
