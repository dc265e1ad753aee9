//! Error taxonomy
//!
//! Errors fall into four kinds, and the kind alone decides whether a failure
//! is recovered locally or fails the batch:
//!
//! | kind             | examples                                   | handling                      |
//! |------------------|--------------------------------------------|-------------------------------|
//! | `Configuration`  | unknown entity, missing destination        | fails the batch               |
//! | `Data`           | untransformable or rejected value          | skip property / array element |
//! | `Shape`          | too many values for a to-one relationship  | fails the batch               |
//! | `Infrastructure` | query or commit failure, deleted object    | fails the batch               |

use persist_store::{AttributeType, StoreError};
use serde_json::Value;

/// Classification of a [`FillError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Data,
    Shape,
    Infrastructure,
}

// ============================================================================
// Transformation
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("no transformer found for {value} to {target:?}")]
    NoTransformerFound { value: Value, target: AttributeType },
    #[error("{value:?} is not a valid {target:?} value")]
    InvalidFormat { value: String, target: AttributeType },
    #[error("invalid date {0:?}")]
    InvalidDate(String),
    #[error("invalid URL {0:?}")]
    InvalidUrl(String),
    #[error("{0} is not a boolean value, expected 0 or 1")]
    InvalidBoolean(Value),
    #[error("{value} is out of range for {target:?}")]
    OutOfRange { value: Value, target: AttributeType },
    #[error("{0}")]
    Custom(String),
}

// ============================================================================
// Filling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("unknown entity {0}")]
    UnknownEntity(String),
    #[error("no mapping registered for entity {0}")]
    UnregisteredEntity(String),
    #[error("identification attribute {attribute} not found for entity {entity}")]
    IdentificationAttributeNotFound { attribute: String, entity: String },
    #[error("identification property not found for entity {0}, declare an identity and map its attribute")]
    IdentificationPropertyNotFound(String),
    #[error("identification value {key} not found")]
    IdentificationValueNotFound { key: String },
    #[error("invalid identification value {0}")]
    InvalidIdentificationValue(Value),
    #[error("property {0} not found")]
    PropertyNotFound(String),
    #[error("too many values for relationship {0}")]
    TooManyValues(String),
    #[error("relationship {0} has no destination entity")]
    MissingDestinationEntity(String),
    #[error("entity {entity} is not a subentity of {superentity}")]
    NotSubentity { entity: String, superentity: String },
    #[error("{0} is not identifiable and cannot be referenced by value")]
    NonIdentifiableType(String),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FillError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FillError::UnknownEntity(_)
            | FillError::UnregisteredEntity(_)
            | FillError::IdentificationAttributeNotFound { .. }
            | FillError::IdentificationPropertyNotFound(_)
            | FillError::MissingDestinationEntity(_)
            | FillError::NotSubentity { .. } => ErrorKind::Configuration,
            FillError::IdentificationValueNotFound { .. }
            | FillError::InvalidIdentificationValue(_)
            | FillError::PropertyNotFound(_)
            | FillError::NonIdentifiableType(_)
            | FillError::Transform(_) => ErrorKind::Data,
            FillError::TooManyValues(_) => ErrorKind::Shape,
            FillError::Store(err) if err.is_data() => ErrorKind::Data,
            FillError::Store(err) if err.is_configuration() => ErrorKind::Configuration,
            FillError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Only data errors may be skipped at property or element granularity.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Data
    }
}

/// Explicit local recovery: turn a recoverable failure into `None` after
/// reporting it, and let everything else propagate.
pub(crate) trait Recover<T> {
    fn recover(self, report: impl FnOnce(&FillError)) -> Result<Option<T>, FillError>;
}

impl<T> Recover<T> for Result<T, FillError> {
    fn recover(self, report: impl FnOnce(&FillError)) -> Result<Option<T>, FillError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_recoverable() => {
                report(&err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

// ============================================================================
// Mapping Registration
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("entity {entity} maps property {property} more than once")]
    DuplicateProperty { entity: String, property: String },
    #[error("entity {entity} maps key {key} more than once")]
    DuplicateKey { entity: String, key: String },
    #[error("entity {0} is registered more than once")]
    DuplicateEntity(String),
    #[error("entity {entity} is identified by {attribute}, which has no property mapping")]
    IdentificationPropertyNotFound { entity: String, attribute: String },
    #[error("entity {entity} shares identity with {superentity} but declares no identity")]
    SharedIdentityWithoutIdentity { entity: String, superentity: String },
}

// ============================================================================
// Batch Boundary
// ============================================================================

/// Failure of a whole reconciliation batch.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("invalid JSON data: {0}")]
    InvalidJsonData(#[source] serde_json::Error),
    #[error("deleting orphans failed: {0}")]
    OrphanDeletionFailed(#[source] FillError),
    #[error("filling objects failed: {0}")]
    FillingObjectsFailed(#[source] FillError),
    #[error("saving failed: {0}")]
    SaveFailed(#[source] StoreError),
    #[error("batch aborted: {0}")]
    BatchAborted(String),
}
