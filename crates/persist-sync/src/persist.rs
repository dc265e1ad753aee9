//! Persist: the reconciliation entry point
//!
//! A [`Persist`] ties a confined store [`Context`] to a mapping [`Registry`].
//! Every call to [`Persist::reconcile`] becomes one batch on the context's
//! change queue:
//!
//! ```text
//! parse bytes ─► prune orphans ─► fill objects ─► save
//!   (off the      └──────────── one perform each ─────┘
//!    context)            on failure: rollback
//! ```
//!
//! Batches against the same store run strictly one after the other, whether
//! they were submitted through one `Persist`, its clones, or separate
//! `Persist` values sharing a context. A failed batch discards every change
//! pending in the store, so nothing it did is committed by a later save.

use crate::config::PersistConfig;
use crate::error::{FillError, PersistError};
use crate::fill::Reconciler;
use crate::mapping::Registry;
use persist_store::{ChangeQueue, Context, ObjectId, ObjectStore, Predicate, SaveRecord, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// Batch Events
// ============================================================================

/// Events emitted while batches run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PersistEvent {
    /// Orphans deleted before filling
    OrphansDeleted { entity: String, count: usize },
    /// Objects reconciled from the document
    ObjectsFilled { entity: String, objects: Vec<ObjectId> },
    /// Batch committed
    Saved { record: SaveRecord },
    /// Batch failed; later batches still run
    BatchFailed { entity: String, message: String },
}

/// Callback for batch events
pub type PersistEventHandler = Arc<dyn Fn(&PersistEvent) + Send + Sync>;

/// Outcome of a successful batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Top-level objects of the document, in document order.
    pub objects: Vec<ObjectId>,
    /// Number of orphans deleted.
    pub deleted: usize,
    /// What the batch committed; empty when the store already matched.
    pub save: SaveRecord,
}

enum Document {
    Parsed(Value),
    Raw(Vec<u8>),
}

// ============================================================================
// Persist
// ============================================================================

/// Reconciles JSON documents into an object store.
pub struct Persist<S: ObjectStore> {
    context: Context<S>,
    registry: Arc<Registry>,
    config: PersistConfig,
    handlers: Arc<Vec<PersistEventHandler>>,
}

impl<S: ObjectStore> Clone for Persist<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<S: ObjectStore> Persist<S> {
    pub fn new(context: Context<S>, registry: Registry) -> Self {
        Self {
            context,
            registry: Arc::new(registry),
            config: PersistConfig::default(),
            handlers: Arc::new(Vec::new()),
        }
    }

    pub fn with_config(mut self, config: PersistConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an event handler. Clones made before this call keep their own
    /// handler list.
    pub fn on_event(&mut self, handler: impl Fn(&PersistEvent) + Send + Sync + 'static) {
        Arc::make_mut(&mut self.handlers).push(Arc::new(handler));
    }

    pub fn context(&self) -> &Context<S> {
        &self.context
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn queue(&self) -> &ChangeQueue {
        self.context.queue()
    }

    // ========================================================================
    // Batches
    // ========================================================================

    /// Reconcile `json` as objects of `entity`.
    ///
    /// Orphans are only looked for among objects matching `scope`. The batch
    /// is queued immediately; the returned future resolves when it settles.
    pub fn reconcile(
        &self,
        json: Value,
        entity: impl Into<String>,
        scope: Option<Predicate>,
    ) -> impl Future<Output = Result<Reconciliation, PersistError>> + Send {
        self.submit(Document::Parsed(json), entity.into(), scope)
    }

    /// Like [`reconcile`](Self::reconcile), for raw JSON bytes.
    pub fn reconcile_slice(
        &self,
        bytes: impl Into<Vec<u8>>,
        entity: impl Into<String>,
        scope: Option<Predicate>,
    ) -> impl Future<Output = Result<Reconciliation, PersistError>> + Send {
        self.submit(Document::Raw(bytes.into()), entity.into(), scope)
    }

    fn submit(
        &self,
        document: Document,
        entity: String,
        scope: Option<Predicate>,
    ) -> impl Future<Output = Result<Reconciliation, PersistError>> + Send {
        let batch = Batch {
            context: self.context.clone(),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            handlers: Arc::clone(&self.handlers),
            entity,
            scope,
        };
        tracing::debug!(target: "persist::queue", entity = %batch.entity, "enqueueing batch");
        let queued = self.context.enqueue(batch.run(document));
        async move {
            match queued.await {
                Ok(outcome) => outcome,
                Err(StoreError::BatchAborted(reason)) => Err(PersistError::BatchAborted(reason)),
                Err(err) => Err(PersistError::BatchAborted(err.to_string())),
            }
        }
    }

    // ========================================================================
    // Single Steps
    // ========================================================================
    //
    // Each step is queued like a batch, so it never lands between the stages
    // of a running batch. Steps do not save; their changes stay pending until
    // `save`, and a later failing batch discards them.

    /// Find or create the object of `entity` identified by `identity`.
    pub async fn stub(&self, entity: &str, identity: &Value) -> Result<ObjectId, FillError> {
        let (entity, identity) = (entity.to_string(), identity.clone());
        self.step(move |reconciler| reconciler.stub(&entity, &identity))
            .await
    }

    /// Reconcile `json` as objects of `entity` without pruning or saving.
    pub async fn fill(&self, entity: &str, json: &Value) -> Result<Vec<ObjectId>, FillError> {
        let (entity, json) = (entity.to_string(), json.clone());
        self.step(move |reconciler| reconciler.fill(&entity, &json))
            .await
    }

    /// Delete the objects of `entity` within `scope` that `keeping` does not
    /// mention, without saving.
    pub async fn prune_orphans(
        &self,
        entity: &str,
        keeping: &Value,
        scope: Option<&Predicate>,
    ) -> Result<usize, FillError> {
        let (entity, keeping, scope) = (entity.to_string(), keeping.clone(), scope.cloned());
        self.step(move |reconciler| reconciler.prune_orphans(&entity, &keeping, scope.as_ref()))
            .await
    }

    /// Commit whatever is pending in the store.
    pub async fn save(&self) -> Result<SaveRecord, StoreError> {
        let context = self.context.clone();
        self.context
            .enqueue(async move { context.perform(|store| store.save()).await })
            .await?
    }

    async fn step<T>(
        &self,
        block: impl FnOnce(&mut Reconciler<'_>) -> Result<T, FillError> + Send + 'static,
    ) -> Result<T, FillError>
    where
        T: Send + 'static,
    {
        let context = self.context.clone();
        let registry = Arc::clone(&self.registry);
        self.context
            .enqueue(async move {
                context
                    .perform(|store| block(&mut Reconciler::new(store, &registry)))
                    .await
            })
            .await?
    }
}

impl<S: ObjectStore> std::fmt::Debug for Persist<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persist")
            .field("context", &self.context)
            .field("entities", &self.registry.len())
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// ============================================================================
// Batch Execution
// ============================================================================

struct Batch<S: ObjectStore> {
    context: Context<S>,
    registry: Arc<Registry>,
    config: PersistConfig,
    handlers: Arc<Vec<PersistEventHandler>>,
    entity: String,
    scope: Option<Predicate>,
}

impl<S: ObjectStore> Batch<S> {
    fn emit(&self, event: PersistEvent) {
        for handler in self.handlers.iter() {
            handler(&event);
        }
    }

    async fn run(self, document: Document) -> Result<Reconciliation, PersistError> {
        let outcome = self.execute(document).await;
        if let Err(err) = &outcome {
            if matches!(
                err,
                PersistError::OrphanDeletionFailed(_)
                    | PersistError::FillingObjectsFailed(_)
                    | PersistError::SaveFailed(_)
            ) {
                self.context.perform(|store| store.rollback()).await;
            }
            tracing::error!(target: "persist::context", entity = %self.entity, error = %err, "batch failed");
            self.emit(PersistEvent::BatchFailed {
                entity: self.entity.clone(),
                message: err.to_string(),
            });
        }
        outcome
    }

    async fn execute(&self, document: Document) -> Result<Reconciliation, PersistError> {
        let json = match document {
            Document::Parsed(json) => json,
            Document::Raw(bytes) => parse(bytes, self.config.parse_in_background).await?,
        };
        let registry = self.registry.as_ref();
        let entity = self.entity.as_str();

        let deleted = if self.config.delete_orphans {
            let scope = self.scope.as_ref();
            let deleted = self
                .context
                .perform(|store| {
                    Reconciler::new(store, registry).prune_orphans(entity, &json, scope)
                })
                .await
                .map_err(PersistError::OrphanDeletionFailed)?;
            self.emit(PersistEvent::OrphansDeleted {
                entity: self.entity.clone(),
                count: deleted,
            });
            deleted
        } else {
            0
        };

        let objects = self
            .context
            .perform(|store| Reconciler::new(store, registry).fill(entity, &json))
            .await
            .map_err(PersistError::FillingObjectsFailed)?;
        self.emit(PersistEvent::ObjectsFilled {
            entity: self.entity.clone(),
            objects: objects.clone(),
        });

        let save = self
            .context
            .perform(|store| store.save())
            .await
            .map_err(PersistError::SaveFailed)?;
        tracing::debug!(
            target: "persist::context",
            entity,
            objects = objects.len(),
            deleted,
            empty = save.is_empty(),
            "batch saved"
        );
        self.emit(PersistEvent::Saved {
            record: save.clone(),
        });

        Ok(Reconciliation {
            objects,
            deleted,
            save,
        })
    }
}

async fn parse(bytes: Vec<u8>, in_background: bool) -> Result<Value, PersistError> {
    let parsed = if in_background {
        tokio::task::spawn_blocking(move || serde_json::from_slice::<Value>(&bytes))
            .await
            .map_err(|err| PersistError::BatchAborted(err.to_string()))?
    } else {
        serde_json::from_slice::<Value>(&bytes)
    };
    parsed.map_err(|err| {
        tracing::error!(target: "persist::parse", error = %err, "invalid JSON data");
        PersistError::InvalidJsonData(err)
    })
}
