//! Named remote writes and the machinery that applies their operation
//! batches.

pub mod queue;
pub mod worker;

pub use queue::WriteQueue;
pub use worker::{DrainSummary, QueueWorker, RetryPolicy, Transport};

use crate::error::AppError;
use crate::model::AccountId;
use crate::store::StoreOp;
use crate::update::OperationBatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Primitive request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(u64),
    String(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<AccountId> for ParamValue {
    fn from(value: AccountId) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A named remote operation with a flat map of primitive parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub command: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

impl WriteRequest {
    pub fn new<C: Into<String>>(command: C) -> Self {
        Self {
            command: command.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn param<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }
}

/// Receives every intent's request and batch.
///
/// Implementations apply `batch.optimistic` before returning and later
/// apply exactly one of `batch.success` / `batch.failure`.
pub trait WriteDispatcher: Send + Sync {
    fn dispatch(&self, request: WriteRequest, batch: OperationBatch) -> Result<(), AppError>;
}

/// How the remote authority answered a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemoteOutcome {
    Confirmed,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Worth retrying: timeouts, dropped connections.
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("transport failure: {0}")]
    Fatal(String),
}

/// A dispatched write whose terminal sequence has not been applied yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub request_id: u64,
    pub request: WriteRequest,
    #[serde(default)]
    pub success: Vec<StoreOp>,
    #[serde(default)]
    pub failure: Vec<StoreOp>,
}
