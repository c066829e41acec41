pub mod memory;
pub mod patch;

pub use memory::MemoryStore;
pub use patch::Patch;

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

const REPORT_PREFIX: &str = "report_";
const REPORT_ACTIONS_PREFIX: &str = "reportActions_";
const PERSONAL_DETAILS_KEY: &str = "personalDetailsList";
const TASK_DRAFT_KEY: &str = "task";

/// Store key, namespaced by collection and identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StoreKey {
    Report(String),
    ReportActions(String),
    PersonalDetailsList,
    TaskDraft,
}

impl StoreKey {
    pub fn report<I: Into<String>>(report_id: I) -> Self {
        Self::Report(report_id.into())
    }

    pub fn report_actions<I: Into<String>>(report_id: I) -> Self {
        Self::ReportActions(report_id.into())
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Report(id) => write!(f, "{REPORT_PREFIX}{id}"),
            Self::ReportActions(id) => write!(f, "{REPORT_ACTIONS_PREFIX}{id}"),
            Self::PersonalDetailsList => f.write_str(PERSONAL_DETAILS_KEY),
            Self::TaskDraft => f.write_str(TASK_DRAFT_KEY),
        }
    }
}

impl FromStr for StoreKey {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == PERSONAL_DETAILS_KEY {
            return Ok(Self::PersonalDetailsList);
        }
        if raw == TASK_DRAFT_KEY {
            return Ok(Self::TaskDraft);
        }
        if let Some(id) = raw.strip_prefix(REPORT_ACTIONS_PREFIX)
            && !id.is_empty()
        {
            return Ok(Self::ReportActions(id.to_string()));
        }
        if let Some(id) = raw.strip_prefix(REPORT_PREFIX)
            && !id.is_empty()
        {
            return Ok(Self::Report(id.to_string()));
        }
        Err(AppError::invalid_data(format!("unknown store key '{raw}'")))
    }
}

impl TryFrom<String> for StoreKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StoreKey> for String {
    fn from(key: StoreKey) -> Self {
        key.to_string()
    }
}

/// A single store write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StoreOp {
    /// Unconditionally sets the document; `None` deletes the key.
    Replace { key: StoreKey, value: Option<Value> },
    /// Deep-merges into the existing document, creating it if absent.
    Merge { key: StoreKey, patch: Patch },
}

impl StoreOp {
    pub fn replace(key: StoreKey, value: Value) -> Self {
        Self::Replace {
            key,
            value: Some(value),
        }
    }

    pub fn remove(key: StoreKey) -> Self {
        Self::Replace { key, value: None }
    }

    pub fn merge<P: Into<Patch>>(key: StoreKey, patch: P) -> Self {
        Self::Merge {
            key,
            patch: patch.into(),
        }
    }

    pub fn key(&self) -> &StoreKey {
        match self {
            Self::Replace { key, .. } => key,
            Self::Merge { key, .. } => key,
        }
    }
}

/// Keyed document store shared between the orchestrator and the dispatcher.
///
/// Every single operation is applied atomically; listeners run after the
/// write is visible.
pub trait EntityStore: Send + Sync {
    fn get(&self, key: &StoreKey) -> Option<Value>;

    fn keys(&self) -> Vec<StoreKey>;

    fn replace(&self, key: &StoreKey, value: Option<Value>);

    fn merge(&self, key: &StoreKey, patch: &Patch);

    fn apply(&self, op: &StoreOp) {
        match op {
            StoreOp::Replace { key, value } => self.replace(key, value.clone()),
            StoreOp::Merge { key, patch } => self.merge(key, patch),
        }
    }

    fn apply_all(&self, ops: &[StoreOp]) {
        for op in ops {
            self.apply(op);
        }
    }
}
