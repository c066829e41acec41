use super::{AccountId, ErrorFields, PendingFields};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    Chat,
    Task,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateNum {
    #[default]
    Open,
    Submitted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusNum {
    #[default]
    Open,
    Closed,
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPreference {
    Always,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteCapability {
    All,
    Admins,
}

/// Logical task state derived from the `(stateNum, statusNum)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskLifecycle {
    Open,
    Completed,
    Cancelled,
}

impl TaskLifecycle {
    pub fn fields(self) -> (StateNum, StatusNum) {
        match self {
            Self::Open => (StateNum::Open, StatusNum::Open),
            Self::Completed => (StateNum::Submitted, StatusNum::Approved),
            Self::Cancelled => (StateNum::Submitted, StatusNum::Closed),
        }
    }
}

/// A conversation document. Tasks are reports of type [`ReportType::Task`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "reportID")]
    pub report_id: String,
    #[serde(default)]
    pub report_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub report_type: ReportType,
    #[serde(
        rename = "ownerAccountID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_account_id: Option<AccountId>,
    #[serde(rename = "managerID", default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<AccountId>,
    #[serde(
        rename = "parentReportID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_report_id: Option<String>,
    #[serde(
        rename = "parentReportActionID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_report_action_id: Option<String>,
    #[serde(rename = "policyID", default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(rename = "participantAccountIDs", default)]
    pub participant_account_ids: Vec<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_preference: Option<NotificationPreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_capability: Option<WriteCapability>,
    #[serde(default)]
    pub state_num: StateNum,
    #[serde(default)]
    pub status_num: StatusNum,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visible_action_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_text: Option<String>,
    #[serde(
        rename = "lastActorAccountID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_actor_account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_time: Option<String>,
    #[serde(default)]
    pub is_optimistic_report: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub is_deleted_parent_action: bool,
    #[serde(default, skip_serializing_if = "PendingFields::is_empty")]
    pub pending_fields: PendingFields,
    #[serde(default, skip_serializing_if = "ErrorFields::is_empty")]
    pub error_fields: ErrorFields,
}

impl Report {
    pub fn is_task(&self) -> bool {
        self.report_type == ReportType::Task
    }

    pub fn lifecycle(&self) -> TaskLifecycle {
        if self.is_deleted_parent_action {
            return TaskLifecycle::Cancelled;
        }
        match (self.state_num, self.status_num) {
            (StateNum::Submitted, StatusNum::Closed) => TaskLifecycle::Cancelled,
            (StateNum::Submitted, StatusNum::Approved) => TaskLifecycle::Completed,
            _ => TaskLifecycle::Open,
        }
    }

    /// A manager id of zero is the "unassigned" marker used on the wire.
    pub fn assignee(&self) -> Option<AccountId> {
        self.manager_id.filter(|id| *id != 0)
    }
}
