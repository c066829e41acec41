//! Optimistic/success/failure operation batches and the builders that
//! produce them.

pub mod builder;

pub use crate::store::StoreOp;
pub use builder::{
    ActionFailure, CreateFailure, FieldChange, append_action, create_entity, mutate_fields,
    restore_fields,
};

use crate::error::AppError;
use crate::store::StoreKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The three sequences one intent hands to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationBatch {
    pub optimistic: Vec<StoreOp>,
    pub success: Vec<StoreOp>,
    pub failure: Vec<StoreOp>,
}

impl OperationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every sequence of `other` after the matching sequence of `self`.
    pub fn extend(&mut self, other: OperationBatch) {
        self.optimistic.extend(other.optimistic);
        self.success.extend(other.success);
        self.failure.extend(other.failure);
    }

    pub fn push_optimistic(&mut self, op: StoreOp) {
        self.optimistic.push(op);
    }

    pub fn push_success(&mut self, op: StoreOp) {
        self.success.push(op);
    }

    pub fn push_failure(&mut self, op: StoreOp) {
        self.failure.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.optimistic.is_empty() && self.success.is_empty() && self.failure.is_empty()
    }

    pub fn optimistic_keys(&self) -> BTreeSet<&StoreKey> {
        self.optimistic.iter().map(StoreOp::key).collect()
    }

    /// Rejects a batch where an optimistic write has no success or failure
    /// write on the same key.
    pub fn validate(&self) -> Result<(), AppError> {
        let terminal: BTreeSet<&StoreKey> = self
            .success
            .iter()
            .chain(self.failure.iter())
            .map(StoreOp::key)
            .collect();
        let unmatched: Vec<String> = self
            .optimistic_keys()
            .into_iter()
            .filter(|key| !terminal.contains(key))
            .map(ToString::to_string)
            .collect();
        if unmatched.is_empty() {
            Ok(())
        } else {
            Err(AppError::invalid_data(format!(
                "optimistic writes without terminal ops: {}",
                unmatched.join(", ")
            )))
        }
    }
}
