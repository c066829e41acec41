use super::{PendingWrite, RemoteOutcome, WriteDispatcher, WriteRequest};
use crate::error::AppError;
use crate::store::EntityStore;
use crate::update::OperationBatch;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Ordered outbox of dispatched writes.
///
/// `dispatch` applies the optimistic sequence before returning. Writes are
/// resolved strictly front-first, and resolving pops the write before its
/// terminal sequence is applied, so each sequence runs at most once.
pub struct WriteQueue<S: EntityStore + ?Sized> {
    store: Arc<S>,
    pending: Mutex<VecDeque<PendingWrite>>,
    next_request_id: AtomicU64,
    wake: Notify,
}

impl<S: EntityStore + ?Sized> WriteQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_pending(store, Vec::new())
    }

    /// Restores an outbox loaded from disk. Optimistic sequences are not
    /// re-applied; they are already part of the persisted entities.
    pub fn with_pending(store: Arc<S>, pending: Vec<PendingWrite>) -> Self {
        let next = pending
            .iter()
            .map(|write| write.request_id)
            .max()
            .map_or(1, |max| max + 1);
        Self {
            store,
            pending: Mutex::new(pending.into()),
            next_request_id: AtomicU64::new(next),
            wake: Notify::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn pending(&self) -> Vec<PendingWrite> {
        self.with_pending_writes(|pending| pending.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.with_pending_writes(|pending| pending.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn front(&self) -> Option<PendingWrite> {
        self.with_pending_writes(|pending| pending.front().cloned())
    }

    /// Resolves whichever write is at the front of the queue.
    pub fn resolve_next(&self, outcome: RemoteOutcome) -> Result<PendingWrite, AppError> {
        let request_id = self
            .front()
            .map(|write| write.request_id)
            .ok_or_else(|| AppError::dispatch("no pending writes"))?;
        self.resolve(request_id, outcome)
    }

    /// Applies the terminal sequence of `request_id`, which must be at the
    /// front of the queue.
    pub fn resolve(&self, request_id: u64, outcome: RemoteOutcome) -> Result<PendingWrite, AppError> {
        let write = self.with_pending_writes(|pending| match pending.front() {
            Some(front) if front.request_id == request_id => pending
                .pop_front()
                .ok_or_else(|| AppError::dispatch("no pending writes")),
            Some(front) => Err(AppError::dispatch(format!(
                "request {request_id} is not at the front of the queue (front is {})",
                front.request_id
            ))),
            None => Err(AppError::dispatch(format!(
                "request {request_id} is not pending"
            ))),
        })?;

        match &outcome {
            RemoteOutcome::Confirmed => {
                tracing::debug!(request_id, command = %write.request.command, "write confirmed");
                self.store.apply_all(&write.success);
            }
            RemoteOutcome::Rejected { reason } => {
                tracing::warn!(request_id, command = %write.request.command, %reason, "write rejected");
                self.store.apply_all(&write.failure);
            }
        }
        Ok(write)
    }

    /// Completes when a write has been dispatched since the last wake-up.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    fn with_pending_writes<R>(&self, f: impl FnOnce(&mut VecDeque<PendingWrite>) -> R) -> R {
        match self.pending.lock() {
            Ok(mut pending) => f(&mut pending),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl<S: EntityStore + ?Sized> WriteDispatcher for WriteQueue<S> {
    fn dispatch(&self, request: WriteRequest, batch: OperationBatch) -> Result<(), AppError> {
        batch.validate()?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            request_id,
            command = %request.command,
            optimistic = batch.optimistic.len(),
            "dispatching write"
        );

        self.store.apply_all(&batch.optimistic);
        self.with_pending_writes(|pending| {
            pending.push_back(PendingWrite {
                request_id,
                request,
                success: batch.success,
                failure: batch.failure,
            })
        });
        self.wake.notify_one();
        Ok(())
    }
}
