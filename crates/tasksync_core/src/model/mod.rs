pub mod action;
pub mod person;
pub mod report;

pub use action::{ActionName, FragmentType, MessageFragment, ReportAction, ReportActions};
pub use person::{PersonalDetails, PersonalDetailsList, TaskDraft};
pub use report::{
    NotificationPreference, Report, ReportType, StateNum, StatusNum, TaskLifecycle,
    WriteCapability,
};

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type AccountId = u64;

/// Timestamped error descriptors: microsecond timestamp -> translation key.
pub type ErrorMap = BTreeMap<String, String>;

/// Per-operation error descriptors on a report.
pub type ErrorFields = BTreeMap<String, ErrorMap>;

/// Per-field markers for writes still awaiting confirmation.
pub type PendingFields = BTreeMap<String, PendingAction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    Add,
    Update,
    Delete,
}

impl PendingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(AppError::from)
}

pub fn encode<T: Serialize>(entity: &T) -> Result<Value, AppError> {
    serde_json::to_value(entity).map_err(AppError::from)
}
