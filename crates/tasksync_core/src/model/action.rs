use super::report::{ReportType, StateNum, StatusNum};
use super::{AccountId, ErrorMap, PendingAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Activity records of one report, keyed by action id.
pub type ReportActions = BTreeMap<String, ReportAction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    Created,
    AddComment,
    TaskCompleted,
    TaskReopened,
    TaskCancelled,
    TaskEdited,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentType {
    #[default]
    Text,
    Comment,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFragment {
    #[serde(rename = "type", default)]
    pub fragment_type: FragmentType,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(
        rename = "taskReportID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub task_report_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_deleted_parent_action: bool,
}

impl MessageFragment {
    pub fn text<T: Into<String>>(text: T) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn comment<T: Into<String>>(text: T) -> Self {
        let text = text.into();
        Self {
            fragment_type: FragmentType::Comment,
            html: Some(text.clone()),
            text,
            ..Self::default()
        }
    }

    /// Content of a preview whose task has been cancelled.
    pub fn tombstone() -> Self {
        Self {
            fragment_type: FragmentType::Comment,
            text: String::new(),
            html: Some(String::new()),
            task_report_id: None,
            is_edited: true,
            is_deleted_parent_action: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAction {
    #[serde(rename = "reportActionID")]
    pub report_action_id: String,
    #[serde(rename = "actorAccountID", default)]
    pub actor_account_id: AccountId,
    #[serde(default)]
    pub created: String,
    pub action_name: ActionName,
    #[serde(default)]
    pub message: Vec<MessageFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_message: Option<Vec<MessageFragment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    #[serde(default, skip_serializing_if = "ErrorMap::is_empty")]
    pub errors: ErrorMap,
    #[serde(
        rename = "childReportID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub child_report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_type: Option<ReportType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_report_name: Option<String>,
    #[serde(
        rename = "childManagerAccountID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub child_manager_account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_state_num: Option<StateNum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_status_num: Option<StatusNum>,
}

impl ReportAction {
    pub fn new(
        report_action_id: String,
        actor_account_id: AccountId,
        created: String,
        action_name: ActionName,
        message: Vec<MessageFragment>,
    ) -> Self {
        Self {
            report_action_id,
            actor_account_id,
            created,
            action_name,
            message,
            previous_message: None,
            pending_action: Some(PendingAction::Add),
            errors: ErrorMap::new(),
            child_report_id: None,
            child_type: None,
            child_report_name: None,
            child_manager_account_id: None,
            child_state_num: None,
            child_status_num: None,
        }
    }

    pub fn message_text(&self) -> String {
        self.message
            .iter()
            .map(|fragment| fragment.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn is_deleted_parent_action(&self) -> bool {
        self.message
            .first()
            .is_some_and(|fragment| fragment.is_deleted_parent_action)
    }

    /// Whether the record may stand as a conversation's last visible message.
    pub fn is_visible_as_last_action(&self) -> bool {
        if !self.errors.is_empty() || self.pending_action == Some(PendingAction::Delete) {
            return false;
        }
        if self.is_deleted_parent_action() {
            return false;
        }
        !self.message.is_empty()
    }
}
