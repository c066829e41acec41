use crate::model::{AccountId, Report, ReportAction, TaskLifecycle, WriteCapability};
use crate::session::SessionContext;

/// Cancelled either by its own state pair or by a tombstoned preview.
pub fn is_canceled_task_report(task: &Report, parent_action: Option<&ReportAction>) -> bool {
    task.lifecycle() == TaskLifecycle::Cancelled
        || parent_action.is_some_and(ReportAction::is_deleted_parent_action)
}

/// Assignee on the task, falling back to the parent preview's copy.
pub fn get_task_assignee_account_id(
    task: &Report,
    parent_action: Option<&ReportAction>,
) -> Option<AccountId> {
    task.assignee().or_else(|| {
        parent_action
            .and_then(|action| action.child_manager_account_id)
            .filter(|id| *id != 0)
    })
}

pub fn get_task_owner_account_id(task: &Report) -> Option<AccountId> {
    task.owner_account_id
}

/// Unknown parents and parents without a write capability accept comments.
pub fn is_allowed_to_comment(parent: Option<&Report>, session: &SessionContext) -> bool {
    let Some(parent) = parent else {
        return true;
    };
    match parent.write_capability {
        Some(WriteCapability::Admins) => session.is_policy_admin(parent.policy_id.as_deref()),
        Some(WriteCapability::All) | None => true,
    }
}

pub fn can_modify_task(
    task: &Report,
    parent_action: Option<&ReportAction>,
    parent: Option<&Report>,
    session: &SessionContext,
) -> bool {
    if is_canceled_task_report(task, parent_action) {
        return false;
    }
    let acting = Some(session.account_id);
    if acting == get_task_owner_account_id(task)
        || acting == get_task_assignee_account_id(task, parent_action)
    {
        return true;
    }
    is_allowed_to_comment(parent, session)
}
