//! Confined execution context for an object store
//!
//! A store is owned by exactly one [`Context`]. Every read or write happens
//! inside [`Context::perform`], which runs its block with exclusive access to
//! the store. Blocks are synchronous: they cannot await, so a block can never
//! wait on work that itself needs the context.
//!
//! The context also owns the store's [`ChangeQueue`]: work spanning several
//! blocks goes through [`Context::enqueue`] so that it never interleaves with
//! other queued work on the same store, whichever handle submitted it.

use crate::{ChangeQueue, ObjectStore, StoreError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to a confined object store.
pub struct Context<S> {
    store: Arc<Mutex<S>>,
    queue: Arc<ChangeQueue>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<S: ObjectStore> Context<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            queue: Arc::new(ChangeQueue::new()),
        }
    }

    /// Run `block` on the context once every previously submitted block has
    /// finished.
    pub async fn perform<R>(&self, block: impl FnOnce(&mut S) -> R) -> R {
        let mut store = self.store.lock().await;
        block(&mut *store)
    }

    /// Run `work` once every unit queued before it on this store has
    /// settled. See [`ChangeQueue::enqueue`].
    pub fn enqueue<F, T>(&self, work: F) -> impl Future<Output = Result<T, StoreError>> + Send
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.queue.enqueue(work)
    }

    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    /// Whether two handles confine the same store.
    pub fn same_store(&self, other: &Context<S>) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

impl<S: ObjectStore> std::fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("handles", &Arc::strong_count(&self.store))
            .field("busy", &self.queue.is_busy())
            .finish()
    }
}
