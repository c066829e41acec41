use crate::dispatch::{WriteDispatcher, WriteRequest};
use crate::error::AppError;
use crate::model::{
    AccountId, ActionName, MessageFragment, NotificationPreference, PendingAction,
    PersonalDetails, PersonalDetailsList, Report, ReportActions, StateNum, StatusNum,
    TaskDraft, TaskLifecycle, decode, encode,
};
use crate::permissions;
use crate::report_utils::{
    AssigneeChatRequest, AssigneeChatUpdates, assignee_chat_updates, is_unsent_chat,
    build_optimistic_chat_report, build_optimistic_created_action,
    build_optimistic_edited_task_action, build_optimistic_task_action,
    build_optimistic_task_comment_action, build_optimistic_task_report, format_last_message_text,
    get_chat_by_participants, last_visible_action, read_actions, read_parent_action, read_report,
};
use crate::session::ActionContext;
use crate::store::{EntityStore, Patch, StoreKey, StoreOp};
use crate::update::{
    ActionFailure, CreateFailure, FieldChange, OperationBatch, append_action, create_entity,
    mutate_fields, restore_fields,
};
use serde_json::Value;

const CREATE_TASK_OPERATION: &str = "createTask";
const CREATE_TASK_FAILURE: &str = "task.genericCreateTaskFailureMessage";
const TASK_FAILURE: &str = "task.messages.error";

/// Plain-value input of [`TaskActions::create_task`].
#[derive(Debug, Clone, Default)]
pub struct CreateTaskParams {
    pub parent_report_id: String,
    pub title: String,
    pub description: String,
    pub assignee_email: Option<String>,
    pub assignee_account_id: Option<AccountId>,
    pub assignee_chat_report: Option<Report>,
    pub policy_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignee {
    pub account_id: Option<AccountId>,
    pub display_name: String,
    pub subtitle: String,
}

/// Display data for an assignee; empty when the account is unknown.
pub fn get_assignee(assignee_account_id: AccountId, personal_details: &PersonalDetailsList) -> Assignee {
    match personal_details.get(&assignee_account_id) {
        Some(details) => Assignee {
            account_id: Some(details.account_id),
            display_name: details.display_name.clone().unwrap_or_default(),
            subtitle: details.login.clone().unwrap_or_default(),
        },
        None => Assignee::default(),
    }
}

pub fn get_task_owner_account_id(task: &Report) -> Option<AccountId> {
    permissions::get_task_owner_account_id(task)
}

/// One procedure per task intent.
///
/// Every procedure reads snapshots from the store, validates, builds one
/// [`OperationBatch`] and hands it to the dispatcher together with the named
/// request. Nothing is written before validation succeeds. Draft setters
/// write the local-only `task` key directly.
pub struct TaskActions<'a, S: EntityStore + ?Sized, D: WriteDispatcher + ?Sized> {
    ctx: ActionContext<'a>,
    store: &'a S,
    dispatcher: &'a D,
}

impl<'a, S: EntityStore + ?Sized, D: WriteDispatcher + ?Sized> TaskActions<'a, S, D> {
    pub fn new(ctx: ActionContext<'a>, store: &'a S, dispatcher: &'a D) -> Self {
        Self {
            ctx,
            store,
            dispatcher,
        }
    }

    /// Creates a task under `parent_report_id`, optionally assigned, and
    /// returns the new task report id.
    pub fn create_task(&self, params: CreateTaskParams) -> Result<String, AppError> {
        let title = params.title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_input("title is required"));
        }
        let parent_report_id = params.parent_report_id.trim();
        if parent_report_id.is_empty() {
            return Err(AppError::invalid_input("parent report is required"));
        }
        let parent = read_report(self.store, parent_report_id)?;
        if !permissions::is_allowed_to_comment(parent.as_ref(), self.ctx.session) {
            return Err(AppError::not_permitted(format!(
                "not allowed to post in report {parent_report_id}"
            )));
        }

        let session = self.ctx.session;
        let assignee = params.assignee_account_id.filter(|id| *id != 0);
        let policy_id = params
            .policy_id
            .as_deref()
            .or_else(|| parent.as_ref().and_then(|report| report.policy_id.as_deref()));
        let mut task = build_optimistic_task_report(
            &self.ctx,
            assignee,
            parent_report_id,
            title,
            params.description.trim(),
            policy_id,
        );
        let task_id = task.report_id.clone();
        let created = build_optimistic_created_action(&self.ctx, &session.email)?;
        let preview = build_optimistic_task_comment_action(
            &self.ctx,
            &task_id,
            title,
            assignee,
            &format!("task for {title}"),
        )?;
        task.parent_report_action_id = Some(preview.report_action_id.clone());

        let mut batch = create_entity(
            StoreKey::report(&task_id),
            encode(&task)?,
            &["createChat", "reportName", "description", "managerID"],
            CreateFailure::Error {
                operation: CREATE_TASK_OPERATION.to_string(),
                error: self.ctx.microsecond_error(CREATE_TASK_FAILURE),
            },
        );
        batch.extend(append_action(&task_id, &created, ActionFailure::Clear)?);

        // The assignee chat may be the share destination, so it is written
        // before the parent preview fields are merged into it.
        let mut chat_updates = None;
        let mut synthesized_chat = None;
        if let Some(assignee_id) = assignee.filter(|id| *id != session.account_id) {
            let chat = self.resolve_assignee_chat(assignee_id, params.assignee_chat_report)?;
            if is_unsent_chat(&chat) {
                synthesized_chat = Some(chat.report_id.clone());
            }
            chat_updates = Some(assignee_chat_updates(
                &self.ctx,
                self.store,
                &AssigneeChatRequest {
                    assignee_account_id: assignee_id,
                    assignee_email: params.assignee_email.as_deref().unwrap_or_default(),
                    task_report_id: &task_id,
                    parent_report_id,
                    title,
                    chat: &chat,
                },
                &mut batch,
            )?);
        }

        if parent.is_none() && synthesized_chat.as_deref() != Some(parent_report_id) {
            return Err(AppError::invalid_input(format!(
                "parent report {parent_report_id} not found"
            )));
        }

        let parent_key = StoreKey::report(parent_report_id);
        let snapshot = self.store.get(&parent_key);
        let mut parent_batch = restore_fields(
            parent_key,
            snapshot.as_ref(),
            vec![
                ("lastVisibleActionCreated", Value::from(preview.created.clone())),
                (
                    "lastMessageText",
                    Value::from(format_last_message_text(&preview.message_text())),
                ),
                ("lastActorAccountID", Value::from(session.account_id)),
                ("lastReadTime", Value::from(preview.created.clone())),
            ],
        );
        parent_batch.extend(append_action(
            parent_report_id,
            &preview,
            ActionFailure::Error(self.ctx.microsecond_error(CREATE_TASK_FAILURE)),
        )?);
        if synthesized_chat.as_deref() == Some(parent_report_id) {
            // Removing the chat already discards the preview.
            parent_batch.failure.clear();
        }
        batch.extend(parent_batch);

        let chat_ids = chat_updates.unwrap_or_default();
        let request = WriteRequest::new("CreateTask")
            .param("parentReportActionID", preview.report_action_id.as_str())
            .param("parentReportID", parent_report_id)
            .param("taskReportID", task_id.as_str())
            .param("createdTaskReportActionID", created.report_action_id.as_str())
            .param("title", title)
            .param("description", task.description.clone().unwrap_or_default())
            .param("assignee", params.assignee_email.unwrap_or_default())
            .param("assigneeAccountID", assignee.unwrap_or_default())
            .param("assigneeChatReportID", chat_ids.chat_report_id)
            .param(
                "assigneeChatReportActionID",
                chat_ids.assigned_action_id.unwrap_or_default(),
            )
            .param(
                "assigneeChatCreatedReportActionID",
                chat_ids.created_action_id.unwrap_or_default(),
            );
        self.dispatch(request, batch)?;
        self.clear_out_task_info();
        Ok(task_id)
    }

    pub fn complete_task(&self, task_report_id: &str) -> Result<(), AppError> {
        let (task, snapshot) = self.require_task(task_report_id)?;
        self.require_modifiable(&task)?;
        if task.lifecycle() != TaskLifecycle::Open {
            return Err(AppError::invalid_input(format!(
                "task {} is not open",
                task.report_id
            )));
        }

        let completed =
            build_optimistic_task_action(&self.ctx, ActionName::TaskCompleted, "marked as complete")?;
        let mut batch = mutate_fields(
            StoreKey::report(&task.report_id),
            Some(&snapshot),
            lifecycle_changes(TaskLifecycle::Completed)?,
        );
        batch.extend(append_action(
            &task.report_id,
            &completed,
            ActionFailure::Error(self.ctx.microsecond_error(TASK_FAILURE)),
        )?);

        let request = WriteRequest::new("CompleteTask")
            .param("taskReportID", task.report_id.as_str())
            .param("completedTaskReportActionID", completed.report_action_id.as_str());
        self.dispatch(request, batch)
    }

    pub fn reopen_task(&self, task_report_id: &str) -> Result<(), AppError> {
        let (task, snapshot) = self.require_task(task_report_id)?;
        self.require_modifiable(&task)?;
        if task.lifecycle() != TaskLifecycle::Completed {
            return Err(AppError::invalid_input(format!(
                "task {} is not completed",
                task.report_id
            )));
        }

        let message = "marked as incomplete";
        let reopened = build_optimistic_task_action(&self.ctx, ActionName::TaskReopened, message)?;
        let mut changes = lifecycle_changes(TaskLifecycle::Open)?;
        changes.extend([
            FieldChange::unmarked("lastVisibleActionCreated", reopened.created.clone()),
            FieldChange::unmarked("lastMessageText", message),
            FieldChange::unmarked("lastActorAccountID", reopened.actor_account_id),
            FieldChange::unmarked("lastReadTime", reopened.created.clone()),
        ]);
        let mut batch = mutate_fields(StoreKey::report(&task.report_id), Some(&snapshot), changes);
        batch.extend(append_action(
            &task.report_id,
            &reopened,
            ActionFailure::Error(self.ctx.microsecond_error(TASK_FAILURE)),
        )?);

        let request = WriteRequest::new("ReopenTask")
            .param("taskReportID", task.report_id.as_str())
            .param("reopenedTaskReportActionID", reopened.report_action_id.as_str());
        self.dispatch(request, batch)
    }

    /// Edits title and/or description. Unsupplied fields keep their value
    /// and are never marked pending.
    pub fn edit_task(
        &self,
        task_report_id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), AppError> {
        let (task, snapshot) = self.require_task(task_report_id)?;
        self.require_modifiable(&task)?;

        let report_name = title.unwrap_or(&task.report_name).trim().to_string();
        if report_name.is_empty() {
            return Err(AppError::invalid_input("title is required"));
        }
        let prior_description = task.description.clone().unwrap_or_default();
        let report_description = description
            .unwrap_or(&prior_description)
            .trim()
            .to_string();

        let title_changed = title.is_some() && report_name != task.report_name;
        let description_changed = description.is_some() && report_description != prior_description;
        let changes = vec![
            field_change("reportName", report_name.clone(), title_changed),
            field_change("description", report_description.clone(), description_changed),
        ];

        let edited = build_optimistic_edited_task_action(&self.ctx)?;
        let mut batch = mutate_fields(StoreKey::report(&task.report_id), Some(&snapshot), changes);
        batch.extend(append_action(
            &task.report_id,
            &edited,
            ActionFailure::Error(self.ctx.microsecond_error(TASK_FAILURE)),
        )?);

        let request = WriteRequest::new("EditTask")
            .param("taskReportID", task.report_id.as_str())
            .param("title", report_name)
            .param("description", report_description)
            .param("editedTaskReportActionID", edited.report_action_id.as_str());
        self.dispatch(request, batch)
    }

    pub fn edit_task_assignee(
        &self,
        task_report_id: &str,
        assignee_email: &str,
        assignee_account_id: AccountId,
        assignee_chat_report: Option<Report>,
    ) -> Result<(), AppError> {
        if assignee_account_id == 0 {
            return Err(AppError::invalid_input("assignee is required"));
        }
        let (task, snapshot) = self.require_task(task_report_id)?;
        self.require_modifiable(&task)?;

        let session = self.ctx.session;
        let owner = task.owner_account_id.unwrap_or_default();
        let preference = if [assignee_account_id, owner].contains(&session.account_id) {
            NotificationPreference::Always
        } else {
            NotificationPreference::Hidden
        };
        let new_relationship = Some(assignee_account_id) != task.assignee()
            && Some(assignee_account_id) != task.owner_account_id;

        let mut changes = vec![
            FieldChange::marked("managerID", assignee_account_id),
            FieldChange::unmarked("notificationPreference", encode(&preference)?),
        ];
        if !task.participant_account_ids.contains(&assignee_account_id) {
            let mut participants = task.participant_account_ids.clone();
            participants.push(assignee_account_id);
            changes.push(FieldChange::unmarked(
                "participantAccountIDs",
                encode(&participants)?,
            ));
        }

        let edited = build_optimistic_edited_task_action(&self.ctx)?;
        let mut batch = mutate_fields(StoreKey::report(&task.report_id), Some(&snapshot), changes);
        batch.extend(append_action(&task.report_id, &edited, ActionFailure::Clear)?);

        let mut chat_ids = AssigneeChatUpdates::default();
        if new_relationship && assignee_account_id != session.account_id {
            let chat = self.resolve_assignee_chat(assignee_account_id, assignee_chat_report)?;
            chat_ids = assignee_chat_updates(
                &self.ctx,
                self.store,
                &AssigneeChatRequest {
                    assignee_account_id,
                    assignee_email,
                    task_report_id: &task.report_id,
                    parent_report_id: task.parent_report_id.as_deref().unwrap_or_default(),
                    title: task.report_name.trim(),
                    chat: &chat,
                },
                &mut batch,
            )?;
        }

        let request = WriteRequest::new("EditTaskAssignee")
            .param("taskReportID", task.report_id.as_str())
            .param("assignee", assignee_email)
            .param("assigneeAccountID", assignee_account_id)
            .param("editedTaskReportActionID", edited.report_action_id.as_str())
            .param("assigneeChatReportID", chat_ids.chat_report_id)
            .param(
                "assigneeChatReportActionID",
                chat_ids.assigned_action_id.unwrap_or_default(),
            )
            .param(
                "assigneeChatCreatedReportActionID",
                chat_ids.created_action_id.unwrap_or_default(),
            );
        self.dispatch(request, batch)
    }

    /// Cancels a task. The parent preview is tombstoned rather than removed,
    /// and stays tombstoned even if the remote write is rejected.
    pub fn cancel_task(&self, task_report_id: &str) -> Result<(), AppError> {
        let (task, snapshot) = self.require_task(task_report_id)?;
        self.require_modifiable(&task)?;

        let session = self.ctx.session;
        let message = format!("deleted task: {}", task.report_name);
        let cancelled = build_optimistic_task_action(&self.ctx, ActionName::TaskCancelled, &message)?;
        let task_key = StoreKey::report(&task.report_id);

        let mut batch = mutate_fields(
            task_key.clone(),
            Some(&snapshot),
            vec![
                FieldChange::unmarked("lastVisibleActionCreated", cancelled.created.clone()),
                FieldChange::unmarked("lastMessageText", format_last_message_text(&message)),
                FieldChange::unmarked("lastActorAccountID", session.account_id),
                FieldChange::unmarked("isDeletedParentAction", true),
            ],
        );
        let (state, status) = TaskLifecycle::Cancelled.fields();
        batch.push_success(StoreOp::merge(task_key.clone(), state_patch(state, status)?));
        batch.push_failure(StoreOp::merge(
            task_key,
            state_patch(task.state_num, task.status_num)?,
        ));
        batch.extend(append_action(&task.report_id, &cancelled, ActionFailure::Remove)?);

        if let (Some(parent_id), Some(preview)) = (
            task.parent_report_id.as_deref(),
            read_parent_action(self.store, &task)?,
        ) {
            let tombstone = vec![MessageFragment::tombstone()];
            let mut actions = read_actions(self.store, parent_id)?;
            if let Some(entry) = actions.get_mut(&preview.report_action_id) {
                entry.message = tombstone.clone();
            }

            // The recomputed preview holds whether or not the cancel succeeds,
            // because the tombstone does.
            let parent_key = StoreKey::report(parent_id);
            let last_fields = last_visible_fields(&actions);
            batch.push_optimistic(StoreOp::merge(parent_key.clone(), last_fields.clone()));
            batch.push_success(StoreOp::merge(parent_key, last_fields));

            let actions_key = StoreKey::report_actions(parent_id);
            let id = preview.report_action_id.clone();
            let cleared = Patch::merge().with(
                id.clone(),
                Patch::merge().with("pendingAction", Patch::Remove),
            );
            batch.push_optimistic(StoreOp::merge(
                actions_key.clone(),
                Patch::merge().with(
                    id,
                    Patch::merge()
                        .with("pendingAction", PendingAction::Update.as_str())
                        .with("previousMessage", Patch::Set(encode(&preview.message)?))
                        .with("message", Patch::Set(encode(&tombstone)?))
                        .with("errors", Patch::Remove),
                ),
            ));
            batch.push_success(StoreOp::merge(actions_key.clone(), cleared.clone()));
            batch.push_failure(StoreOp::merge(actions_key, cleared));
        }

        let request = WriteRequest::new("CancelTask")
            .param("cancelledTaskReportActionID", cancelled.report_action_id.as_str())
            .param("taskReportID", task.report_id.as_str());
        self.dispatch(request, batch)
    }

    /// Dismisses errors on a report. A task whose creation never completed
    /// is discarded together with its records and its parent preview.
    pub fn clear_task_errors(&self, report_id: &str) -> Result<(), AppError> {
        let key = StoreKey::report(report_id);
        let report: Report = match self.store.get(&key) {
            Some(snapshot) => decode(snapshot)?,
            None => {
                return Err(AppError::invalid_input(format!(
                    "report {report_id} not found"
                )));
            }
        };

        let create_failed = report.is_optimistic_report
            && report.error_fields.contains_key(CREATE_TASK_OPERATION);
        if !create_failed {
            self.store.merge(
                &key,
                &Patch::merge()
                    .with("pendingFields", Patch::Remove)
                    .with("errorFields", Patch::Remove),
            );
            return Ok(());
        }

        if let (Some(parent_id), Some(action_id)) = (
            report.parent_report_id.as_deref(),
            report.parent_report_action_id.as_deref(),
        ) {
            self.store.merge(
                &StoreKey::report_actions(parent_id),
                &Patch::merge().with(action_id, Patch::Remove),
            );
            let remaining = read_actions(self.store, parent_id)?;
            self.store
                .merge(&StoreKey::report(parent_id), &last_visible_fields(&remaining));
        }
        self.store.replace(&StoreKey::report_actions(report_id), None);
        self.store.replace(&key, None);
        tracing::debug!(report_id, "discarded task whose creation failed");
        Ok(())
    }

    pub fn can_modify_task(&self, task: &Report) -> Result<bool, AppError> {
        let parent_action = read_parent_action(self.store, task)?;
        let parent = match task.parent_report_id.as_deref() {
            Some(parent_id) => read_report(self.store, parent_id)?,
            None => None,
        };
        Ok(permissions::can_modify_task(
            task,
            parent_action.as_ref(),
            parent.as_ref(),
            self.ctx.session,
        ))
    }

    pub fn get_task_assignee_account_id(&self, task: &Report) -> Result<Option<AccountId>, AppError> {
        let parent_action = read_parent_action(self.store, task)?;
        Ok(permissions::get_task_assignee_account_id(
            task,
            parent_action.as_ref(),
        ))
    }

    /// Records the assignee in the draft, resolving or synthesizing the 1:1
    /// chat with them unless they are the acting user. A synthesized chat is
    /// stored hidden right away and returned for immediate reuse.
    pub fn set_assignee_value(
        &self,
        assignee_email: &str,
        assignee_account_id: AccountId,
        share_destination: &str,
        is_current_user: bool,
    ) -> Result<Option<Report>, AppError> {
        let mut chat_report = None;
        if !is_current_user {
            let session = self.ctx.session;
            let chat = match get_chat_by_participants(
                self.store,
                &[session.account_id, assignee_account_id],
            )? {
                Some(chat) => chat,
                None => {
                    let mut chat = build_optimistic_chat_report(&self.ctx, &[assignee_account_id]);
                    chat.is_hidden = true;
                    self.store
                        .replace(&StoreKey::report(&chat.report_id), Some(encode(&chat)?));

                    let display_name = session
                        .details_for(assignee_account_id)
                        .and_then(|details| details.display_name.clone())
                        .unwrap_or_else(|| assignee_email.to_string());
                    let details = PersonalDetails {
                        account_id: assignee_account_id,
                        login: Some(assignee_email.to_string()),
                        display_name: Some(display_name),
                    };
                    self.store.merge(
                        &StoreKey::PersonalDetailsList,
                        &Patch::merge().with(
                            assignee_account_id.to_string(),
                            Patch::Set(encode(&details)?),
                        ),
                    );
                    chat
                }
            };
            self.set_assignee_chat_report(&chat)?;
            if share_destination.is_empty() {
                self.set_share_destination_value(&chat.report_id);
            }
            chat_report = Some(chat);
        }

        self.merge_draft(
            Patch::merge()
                .with("assignee", assignee_email)
                .with("assigneeAccountID", assignee_account_id),
        );
        Ok(chat_report)
    }

    pub fn get_task_draft(&self) -> Result<TaskDraft, AppError> {
        match self.store.get(&StoreKey::TaskDraft) {
            Some(value) => decode(value),
            None => Ok(TaskDraft::default()),
        }
    }

    pub fn clear_out_task_info(&self) {
        self.store.replace(&StoreKey::TaskDraft, None);
    }

    pub fn set_task_report(&self, report: &Report) -> Result<(), AppError> {
        self.merge_draft(Patch::merge().with("report", Patch::Set(encode(report)?)));
        Ok(())
    }

    pub fn set_details_value(&self, title: &str, description: &str) {
        self.merge_draft(
            Patch::merge()
                .with("title", title.trim())
                .with("description", description.trim()),
        );
    }

    pub fn set_title_value(&self, title: &str) {
        self.merge_draft(Patch::merge().with("title", title.trim()));
    }

    pub fn set_description_value(&self, description: &str) {
        self.merge_draft(Patch::merge().with("description", description.trim()));
    }

    pub fn set_share_destination_value(&self, share_destination: &str) {
        self.merge_draft(Patch::merge().with("shareDestination", share_destination));
    }

    pub fn set_parent_report_id(&self, parent_report_id: &str) {
        self.merge_draft(Patch::merge().with("parentReportID", parent_report_id));
    }

    pub fn set_assignee_chat_report(&self, chat_report: &Report) -> Result<(), AppError> {
        self.merge_draft(
            Patch::merge().with("assigneeChatReport", Patch::Set(encode(chat_report)?)),
        );
        Ok(())
    }

    fn merge_draft(&self, patch: Patch) {
        self.store.merge(&StoreKey::TaskDraft, &patch);
    }

    fn require_task(&self, task_report_id: &str) -> Result<(Report, Value), AppError> {
        let id = task_report_id.trim();
        if id.is_empty() {
            return Err(AppError::invalid_input("task id is required"));
        }
        let snapshot = self
            .store
            .get(&StoreKey::report(id))
            .ok_or_else(|| AppError::invalid_input(format!("task {id} not found")))?;
        let task: Report = decode(snapshot.clone())?;
        if !task.is_task() {
            return Err(AppError::invalid_input(format!("report {id} is not a task")));
        }
        Ok((task, snapshot))
    }

    fn require_modifiable(&self, task: &Report) -> Result<(), AppError> {
        if self.can_modify_task(task)? {
            Ok(())
        } else {
            Err(AppError::not_permitted(format!(
                "account {} may not modify task {}",
                self.ctx.session.account_id, task.report_id
            )))
        }
    }

    /// Prefers the caller's chat (refreshed from the store), then an existing
    /// 1:1 chat, then a new optimistic one.
    fn resolve_assignee_chat(
        &self,
        assignee_account_id: AccountId,
        provided: Option<Report>,
    ) -> Result<Report, AppError> {
        if let Some(chat) = provided {
            return Ok(read_report(self.store, &chat.report_id)?.unwrap_or(chat));
        }
        let participants = [self.ctx.session.account_id, assignee_account_id];
        match get_chat_by_participants(self.store, &participants)? {
            Some(chat) => Ok(chat),
            None => Ok(build_optimistic_chat_report(&self.ctx, &[assignee_account_id])),
        }
    }

    fn dispatch(&self, request: WriteRequest, batch: OperationBatch) -> Result<(), AppError> {
        tracing::debug!(
            command = %request.command,
            account_id = self.ctx.session.account_id,
            "task action"
        );
        self.dispatcher.dispatch(request, batch)
    }
}

fn field_change(name: &str, value: String, changed: bool) -> FieldChange {
    if changed {
        FieldChange::marked(name, value)
    } else {
        FieldChange::unmarked(name, value)
    }
}

fn lifecycle_changes(lifecycle: TaskLifecycle) -> Result<Vec<FieldChange>, AppError> {
    let (state, status) = lifecycle.fields();
    Ok(vec![
        FieldChange::marked("stateNum", encode(&state)?),
        FieldChange::marked("statusNum", encode(&status)?),
    ])
}

fn state_patch(state: StateNum, status: StatusNum) -> Result<Patch, AppError> {
    Ok(Patch::merge()
        .with("stateNum", Patch::Set(encode(&state)?))
        .with("statusNum", Patch::Set(encode(&status)?)))
}

fn last_visible_fields(actions: &ReportActions) -> Patch {
    match last_visible_action(actions) {
        Some(action) => Patch::merge()
            .with(
                "lastMessageText",
                format_last_message_text(&action.message_text()),
            )
            .with("lastVisibleActionCreated", action.created.as_str()),
        None => Patch::merge()
            .with("lastMessageText", "")
            .with("lastVisibleActionCreated", Patch::Remove),
    }
}
