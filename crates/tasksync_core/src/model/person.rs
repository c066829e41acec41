use super::AccountId;
use super::report::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type PersonalDetailsList = BTreeMap<AccountId, PersonalDetails>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetails {
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Local-only state of the task being composed. Never dispatched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(
        rename = "assigneeAccountID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assignee_account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_destination: Option<String>,
    #[serde(
        rename = "parentReportID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_chat_report: Option<Report>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
}
