//! Change queue
//!
//! Serializes units of work against one store. Each unit is spawned as soon
//! as it is submitted and first waits for the unit submitted before it to
//! settle, successfully or not:
//!
//! ```text
//! enqueue(a) ──► [ a ]
//! enqueue(b) ──►        ──► [ b ]          b starts once a has settled
//! enqueue(c) ──►                   ──► [ c ]
//! ```
//!
//! Submission never blocks; the returned future resolves with the unit's
//! own output. Every [`Context`](crate::Context) clone shares one queue.

use crate::StoreError;
use parking_lot::Mutex;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Per-store queue of pending units of work.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    /// Closes when the most recently submitted unit settles.
    tail: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a submitted unit has not settled yet.
    pub fn is_busy(&self) -> bool {
        let mut tail = self.tail.lock();
        match tail.as_mut() {
            Some(receiver) => matches!(receiver.try_recv(), Err(TryRecvError::Empty)),
            None => false,
        }
    }

    /// Run `work` after every unit submitted before it has settled.
    ///
    /// A unit that panics settles with [`StoreError::BatchAborted`]. Must be
    /// called from within a tokio runtime.
    pub fn enqueue<F, T>(&self, work: F) -> impl Future<Output = Result<T, StoreError>> + Send
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (settled, next_tail) = oneshot::channel::<()>();
        let previous = self.tail.lock().replace(next_tail);
        let pending = previous.and_then(|mut receiver| match receiver.try_recv() {
            Err(TryRecvError::Empty) => Some(receiver),
            _ => None,
        });

        if pending.is_some() {
            tracing::debug!(target: "persist::queue", "queued behind a pending batch");
        }

        let handle = tokio::spawn(async move {
            if let Some(previous) = pending {
                // an error only means the previous unit is gone
                let _ = previous.await;
            }
            let output = work.await;
            drop(settled);
            output
        });

        async move {
            handle.await.map_err(|err| {
                tracing::error!(target: "persist::queue", error = %err, "batch aborted");
                StoreError::BatchAborted(err.to_string())
            })
        }
    }
}
