use super::{RemoteOutcome, TransportError, WriteQueue, WriteRequest};
use crate::config::DispatchConfig;
use crate::error::AppError;
use crate::store::EntityStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Delivers a write to the remote authority.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WriteRequest) -> Result<RemoteOutcome, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub confirmed: usize,
    pub rejected: usize,
    pub retries: usize,
}

/// Drains a [`WriteQueue`] through a [`Transport`], front write first.
pub struct QueueWorker<S: EntityStore + ?Sized, T: Transport> {
    queue: Arc<WriteQueue<S>>,
    transport: T,
    policy: RetryPolicy,
}

impl<S: EntityStore + ?Sized, T: Transport> QueueWorker<S, T> {
    pub fn new(queue: Arc<WriteQueue<S>>, transport: T, policy: RetryPolicy) -> Self {
        Self {
            queue,
            transport,
            policy,
        }
    }

    /// Sends every pending write until the queue is empty.
    pub async fn drain(&self) -> Result<DrainSummary, AppError> {
        let mut summary = DrainSummary::default();
        while let Some(write) = self.queue.front() {
            let (outcome, retries) = self.deliver(&write.request).await;
            summary.retries += retries;
            match outcome {
                RemoteOutcome::Confirmed => summary.confirmed += 1,
                RemoteOutcome::Rejected { .. } => summary.rejected += 1,
            }
            self.queue.resolve(write.request_id, outcome)?;
        }
        Ok(summary)
    }

    /// Drains on every dispatch until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<DrainSummary, AppError> {
        let mut total = DrainSummary::default();
        loop {
            let summary = self.drain().await?;
            total.confirmed += summary.confirmed;
            total.rejected += summary.rejected;
            total.retries += summary.retries;
            if *shutdown.borrow() {
                return Ok(total);
            }
            tokio::select! {
                _ = self.queue.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(total);
                    }
                }
            }
        }
    }

    async fn deliver(&self, request: &WriteRequest) -> (RemoteOutcome, usize) {
        let mut attempt = 1;
        loop {
            match self.transport.send(request).await {
                Ok(outcome) => return (outcome, (attempt - 1) as usize),
                Err(TransportError::Transient(reason)) if attempt < self.policy.max_attempts => {
                    tracing::warn!(
                        command = %request.command,
                        attempt,
                        %reason,
                        "transient failure, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(err) => {
                    tracing::warn!(command = %request.command, attempt, error = %err, "giving up on write");
                    let reason = format!("{err} after {attempt} attempt(s)");
                    return (RemoteOutcome::Rejected { reason }, (attempt - 1) as usize);
                }
            }
        }
    }
}
