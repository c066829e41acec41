//! Construction of optimistic reports and activity records, plus the
//! read-side helpers the orchestrator uses on store snapshots.

use crate::error::AppError;
use crate::model::{
    AccountId, ActionName, MessageFragment, NotificationPreference, PendingAction,
    PersonalDetails, Report, ReportAction, ReportActions, ReportType, StateNum, StatusNum,
    WriteCapability, decode, encode,
};
use crate::session::ActionContext;
use crate::store::{EntityStore, Patch, StoreKey, StoreOp};
use crate::update::{ActionFailure, OperationBatch, append_action, restore_fields};
use serde_json::{Value, json};

pub const MAX_PREVIEW_LENGTH: usize = 200;

/// First line of `text`, trimmed and cut to [`MAX_PREVIEW_LENGTH`] characters.
pub fn format_last_message_text(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    first_line.chars().take(MAX_PREVIEW_LENGTH).collect()
}

pub fn build_optimistic_task_report(
    ctx: &ActionContext<'_>,
    assignee: Option<AccountId>,
    parent_report_id: &str,
    title: &str,
    description: &str,
    policy_id: Option<&str>,
) -> Report {
    let owner = ctx.session.account_id;
    let mut participants = vec![owner];
    if let Some(assignee) = assignee
        && assignee != owner
    {
        participants.push(assignee);
    }
    Report {
        report_id: ctx.ids.next_id(),
        report_name: title.to_string(),
        description: Some(description.to_string()),
        report_type: ReportType::Task,
        owner_account_id: Some(owner),
        manager_id: assignee,
        parent_report_id: Some(parent_report_id.to_string()),
        policy_id: policy_id.map(str::to_string),
        participant_account_ids: participants,
        notification_preference: Some(NotificationPreference::Always),
        state_num: StateNum::Open,
        status_num: StatusNum::Open,
        ..Report::default()
    }
}

/// Visible 1:1 conversation between the acting user and `participants`.
/// Callers that stage it before a create set `is_hidden` themselves.
pub fn build_optimistic_chat_report(ctx: &ActionContext<'_>, participants: &[AccountId]) -> Report {
    let mut members = vec![ctx.session.account_id];
    members.extend(participants.iter().copied());
    members.sort_unstable();
    members.dedup();
    Report {
        report_id: ctx.ids.next_id(),
        report_type: ReportType::Chat,
        owner_account_id: None,
        participant_account_ids: members,
        notification_preference: Some(NotificationPreference::Always),
        write_capability: Some(WriteCapability::All),
        is_optimistic_report: true,
        ..Report::default()
    }
}

pub fn build_optimistic_created_action(
    ctx: &ActionContext<'_>,
    creator_email: &str,
) -> Result<ReportAction, AppError> {
    Ok(ReportAction::new(
        ctx.ids.next_id(),
        ctx.session.account_id,
        ctx.db_time()?,
        ActionName::Created,
        vec![
            MessageFragment::text(creator_email),
            MessageFragment::text(" created this report"),
        ],
    ))
}

/// Preview record posted on a conversation that links to a task.
pub fn build_optimistic_task_comment_action(
    ctx: &ActionContext<'_>,
    task_report_id: &str,
    title: &str,
    assignee: Option<AccountId>,
    text: &str,
) -> Result<ReportAction, AppError> {
    let mut fragment = MessageFragment::comment(text);
    fragment.task_report_id = Some(task_report_id.to_string());

    let mut action = ReportAction::new(
        ctx.ids.next_id(),
        ctx.session.account_id,
        ctx.db_time()?,
        ActionName::AddComment,
        vec![fragment],
    );
    action.child_report_id = Some(task_report_id.to_string());
    action.child_type = Some(ReportType::Task);
    action.child_report_name = Some(title.to_string());
    action.child_manager_account_id = assignee;
    action.child_state_num = Some(StateNum::Open);
    action.child_status_num = Some(StatusNum::Open);
    Ok(action)
}

/// Lifecycle record on the task itself (completed, reopened, cancelled).
pub fn build_optimistic_task_action(
    ctx: &ActionContext<'_>,
    action_name: ActionName,
    message: &str,
) -> Result<ReportAction, AppError> {
    Ok(ReportAction::new(
        ctx.ids.next_id(),
        ctx.session.account_id,
        ctx.db_time()?,
        action_name,
        vec![MessageFragment::text(message)],
    ))
}

pub fn build_optimistic_edited_task_action(ctx: &ActionContext<'_>) -> Result<ReportAction, AppError> {
    build_optimistic_task_action(ctx, ActionName::TaskEdited, "edited this task")
}

pub fn read_report<S: EntityStore + ?Sized>(store: &S, report_id: &str) -> Result<Option<Report>, AppError> {
    store
        .get(&StoreKey::report(report_id))
        .map(decode::<Report>)
        .transpose()
}

pub fn read_actions<S: EntityStore + ?Sized>(store: &S, report_id: &str) -> Result<ReportActions, AppError> {
    match store.get(&StoreKey::report_actions(report_id)) {
        Some(value) => decode(value),
        None => Ok(ReportActions::new()),
    }
}

/// The record on the parent conversation that previews `task`.
pub fn read_parent_action<S: EntityStore + ?Sized>(
    store: &S,
    task: &Report,
) -> Result<Option<ReportAction>, AppError> {
    let (Some(parent_id), Some(action_id)) = (&task.parent_report_id, &task.parent_report_action_id)
    else {
        return Ok(None);
    };
    Ok(read_actions(store, parent_id)?.remove(action_id))
}

/// Existing non-task conversation whose members are exactly `participants`.
pub fn get_chat_by_participants<S: EntityStore + ?Sized>(
    store: &S,
    participants: &[AccountId],
) -> Result<Option<Report>, AppError> {
    let mut wanted = participants.to_vec();
    wanted.sort_unstable();
    wanted.dedup();

    for key in store.keys() {
        if !matches!(key, StoreKey::Report(_)) {
            continue;
        }
        let Some(value) = store.get(&key) else {
            continue;
        };
        let report: Report = match decode(value) {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "skipping unreadable report");
                continue;
            }
        };
        if report.is_task() || report.policy_id.is_some() {
            continue;
        }
        let mut members = report.participant_account_ids.clone();
        members.sort_unstable();
        members.dedup();
        if members == wanted {
            return Ok(Some(report));
        }
    }
    Ok(None)
}

/// Latest record that may stand as the conversation's last message.
pub fn last_visible_action(actions: &ReportActions) -> Option<&ReportAction> {
    actions
        .values()
        .filter(|action| action.is_visible_as_last_action())
        .max_by(|left, right| left.created.cmp(&right.created))
}

pub fn last_visible_message(actions: &ReportActions) -> String {
    last_visible_action(actions)
        .map(|action| format_last_message_text(&action.message_text()))
        .unwrap_or_default()
}

/// Optimistic chat that no dispatched write has created yet. Only such a
/// chat may be created (and rolled back) by the next action that uses it.
pub fn is_unsent_chat(chat: &Report) -> bool {
    chat.is_optimistic_report && !chat.pending_fields.contains_key("createChat")
}

/// Ids of the records the assignee conversation path created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssigneeChatUpdates {
    pub chat_report_id: String,
    pub created_action_id: Option<String>,
    pub assigned_action_id: Option<String>,
}

pub struct AssigneeChatRequest<'a> {
    pub assignee_account_id: AccountId,
    pub assignee_email: &'a str,
    pub task_report_id: &'a str,
    pub parent_report_id: &'a str,
    pub title: &'a str,
    pub chat: &'a Report,
}

/// Updates for the 1:1 conversation with a task's assignee.
///
/// A chat that is still unsent is created with its own `created`
/// record and rolled back as a whole on failure, together with the
/// assignee's optimistic personal details. An "assigned to" record is
/// posted unless the chat is the task's parent.
pub fn assignee_chat_updates<S: EntityStore + ?Sized>(
    ctx: &ActionContext<'_>,
    store: &S,
    request: &AssigneeChatRequest<'_>,
    batch: &mut OperationBatch,
) -> Result<AssigneeChatUpdates, AppError> {
    let chat = request.chat;
    let chat_key = StoreKey::report(&chat.report_id);
    let synthesized = is_unsent_chat(chat);
    let mut updates = AssigneeChatUpdates {
        chat_report_id: chat.report_id.clone(),
        ..AssigneeChatUpdates::default()
    };

    if synthesized {
        let created = build_optimistic_created_action(ctx, &ctx.session.email)?;
        let mut document = chat.clone();
        document.is_hidden = false;
        document.pending_fields.insert("createChat".into(), PendingAction::Add);
        batch.push_optimistic(StoreOp::replace(chat_key.clone(), encode(&document)?));
        batch.push_success(StoreOp::merge(
            chat_key.clone(),
            json!({"pendingFields": {"createChat": null}, "isOptimisticReport": false}),
        ));
        batch.push_failure(StoreOp::remove(chat_key.clone()));
        batch.extend(append_action(&chat.report_id, &created, ActionFailure::Remove)?);
        updates.created_action_id = Some(created.report_action_id);

        if ctx.session.details_for(request.assignee_account_id).is_none() {
            let details = PersonalDetails {
                account_id: request.assignee_account_id,
                login: Some(request.assignee_email.to_string()),
                display_name: Some(request.assignee_email.to_string()),
            };
            let entry = request.assignee_account_id.to_string();
            batch.push_optimistic(StoreOp::merge(
                StoreKey::PersonalDetailsList,
                Patch::merge().with(entry.clone(), Patch::Set(encode(&details)?)),
            ));
            batch.push_failure(StoreOp::merge(
                StoreKey::PersonalDetailsList,
                Patch::merge().with(entry, Patch::Remove),
            ));
        }
    }

    if chat.report_id != request.parent_report_id {
        let display_name = match ctx.session.display_name_for(request.assignee_account_id) {
            name if name.is_empty() => request.assignee_email.to_string(),
            name => name,
        };
        let text = format!("assigned to {display_name}");
        let assigned = build_optimistic_task_comment_action(
            ctx,
            request.task_report_id,
            request.title,
            Some(request.assignee_account_id),
            &text,
        )?;
        let on_failure = if synthesized {
            ActionFailure::Remove
        } else {
            ActionFailure::Clear
        };
        batch.extend(append_action(&chat.report_id, &assigned, on_failure)?);

        let preview = vec![
            ("lastVisibleActionCreated", Value::from(assigned.created.clone())),
            ("lastMessageText", Value::from(format_last_message_text(&text))),
            ("lastActorAccountID", Value::from(ctx.session.account_id)),
            ("lastReadTime", Value::from(assigned.created.clone())),
        ];
        if synthesized {
            batch.push_optimistic(StoreOp::merge(chat_key, json_fields(preview)));
        } else {
            let snapshot = store.get(&chat_key);
            batch.extend(restore_fields(chat_key, snapshot.as_ref(), preview));
        }
        updates.assigned_action_id = Some(assigned.report_action_id);
    }

    if synthesized {
        batch.push_failure(StoreOp::remove(StoreKey::report_actions(&chat.report_id)));
    }
    Ok(updates)
}

fn json_fields(fields: Vec<(&str, Value)>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::{
        AssigneeChatRequest, assignee_chat_updates, build_optimistic_chat_report,
        build_optimistic_task_comment_action, format_last_message_text, get_chat_by_participants,
        is_unsent_chat, last_visible_action, last_visible_message,
    };
    use crate::model::{
        ActionName, MessageFragment, PendingAction, Report, ReportAction, ReportActions, encode,
    };
    use crate::session::{ActionContext, SequentialIds, SessionContext, SteppingClock};
    use crate::store::{EntityStore, MemoryStore, StoreKey};
    use crate::update::OperationBatch;
    use time::macros::datetime;

    fn record(id: &str, created: &str, text: &str) -> ReportAction {
        let mut action = ReportAction::new(
            id.into(),
            1,
            created.into(),
            ActionName::AddComment,
            vec![MessageFragment::comment(text)],
        );
        action.pending_action = None;
        action
    }

    #[test]
    fn last_message_text_uses_first_trimmed_line() {
        assert_eq!(format_last_message_text("  task for demo \nsecond"), "task for demo");
        let long = "x".repeat(250);
        assert_eq!(format_last_message_text(&long).len(), 200);
        assert_eq!(format_last_message_text(""), "");
    }

    #[test]
    fn last_visible_action_skips_tombstones_and_errors() {
        let mut actions = ReportActions::new();
        actions.insert("a1".into(), record("a1", "2025-12-20 00:00:00.000", "first"));
        let mut tombstoned = record("a2", "2025-12-20 00:00:01.000", "second");
        tombstoned.message = vec![MessageFragment::tombstone()];
        actions.insert("a2".into(), tombstoned);
        let mut failed = record("a3", "2025-12-20 00:00:02.000", "third");
        failed.errors.insert("1".into(), "task.messages.error".into());
        actions.insert("a3".into(), failed);

        assert_eq!(
            last_visible_action(&actions).map(|action| action.report_action_id.as_str()),
            Some("a1")
        );
        assert_eq!(last_visible_message(&actions), "first");
        assert_eq!(last_visible_message(&ReportActions::new()), "");
    }

    #[test]
    fn chat_lookup_matches_member_set() {
        let store = MemoryStore::new();
        let chat = Report {
            report_id: "C1".into(),
            participant_account_ids: vec![7, 1],
            ..Report::default()
        };
        store.replace(&StoreKey::report("C1"), Some(encode(&chat).unwrap()));

        let found = get_chat_by_participants(&store, &[1, 7]).unwrap();
        assert_eq!(found.map(|report| report.report_id), Some("C1".to_string()));
        assert!(get_chat_by_participants(&store, &[1, 8]).unwrap().is_none());
    }

    #[test]
    fn chat_lookup_skips_unreadable_reports() {
        let store = MemoryStore::new();
        store.replace(
            &StoreKey::report("A0"),
            Some(serde_json::json!({"lastMessageText": "orphan"})),
        );
        let chat = Report {
            report_id: "C1".into(),
            participant_account_ids: vec![1, 7],
            ..Report::default()
        };
        store.replace(&StoreKey::report("C1"), Some(encode(&chat).unwrap()));

        let found = get_chat_by_participants(&store, &[1, 7]).unwrap();
        assert_eq!(found.map(|report| report.report_id), Some("C1".to_string()));
    }

    #[test]
    fn only_unsent_chats_count_as_new() {
        let session = SessionContext::new(1, "owner@example.com");
        let clock = SteppingClock::starting_at(datetime!(2025-12-20 00:00 UTC));
        let ids = SequentialIds::new("id");
        let ctx = ActionContext::new(&session, &clock, &ids);

        let mut chat = build_optimistic_chat_report(&ctx, &[7]);
        assert!(!chat.is_hidden);
        assert!(is_unsent_chat(&chat));

        chat.pending_fields.insert("createChat".into(), PendingAction::Add);
        assert!(!is_unsent_chat(&chat));

        chat.pending_fields.clear();
        chat.is_optimistic_report = false;
        assert!(!is_unsent_chat(&chat));
    }

    #[test]
    fn synthesized_chat_rolls_back_completely() {
        let session = SessionContext::new(1, "owner@example.com");
        let clock = SteppingClock::starting_at(datetime!(2025-12-20 00:00 UTC));
        let ids = SequentialIds::new("id");
        let ctx = ActionContext::new(&session, &clock, &ids);
        let store = MemoryStore::new();
        let chat = build_optimistic_chat_report(&ctx, &[7]);
        let comment = build_optimistic_task_comment_action(&ctx, "T1", "demo", Some(7), "x").unwrap();
        assert_eq!(comment.child_report_id.as_deref(), Some("T1"));

        let mut batch = OperationBatch::new();
        let updates = assignee_chat_updates(
            &ctx,
            &store,
            &AssigneeChatRequest {
                assignee_account_id: 7,
                assignee_email: "ana@example.com",
                task_report_id: "T1",
                parent_report_id: "R1",
                title: "demo",
                chat: &chat,
            },
            &mut batch,
        )
        .unwrap();
        assert!(batch.validate().is_ok());

        store.apply_all(&batch.optimistic);
        let chat_key = StoreKey::report(&chat.report_id);
        let stored = store.get(&chat_key).unwrap();
        assert_eq!(stored["lastMessageText"], "assigned to ana@example.com");
        assert_eq!(stored["isHidden"], false);
        assert!(store.get(&StoreKey::PersonalDetailsList).unwrap().get("7").is_some());
        assert!(updates.created_action_id.is_some());
        assert!(updates.assigned_action_id.is_some());

        store.apply_all(&batch.failure);
        assert_eq!(store.get(&chat_key), None);
        assert_eq!(store.get(&StoreKey::report_actions(&chat.report_id)), None);
        assert_eq!(
            store.get(&StoreKey::PersonalDetailsList),
            Some(serde_json::json!({}))
        );
    }

    #[test]
    fn existing_chat_restores_preview_on_failure() {
        let session = SessionContext::new(1, "owner@example.com");
        let clock = SteppingClock::starting_at(datetime!(2025-12-20 00:00 UTC));
        let ids = SequentialIds::new("id");
        let ctx = ActionContext::new(&session, &clock, &ids);
        let store = MemoryStore::new();
        let chat = Report {
            report_id: "C1".into(),
            participant_account_ids: vec![1, 7],
            last_message_text: Some("hello".into()),
            ..Report::default()
        };
        store.replace(&StoreKey::report("C1"), Some(encode(&chat).unwrap()));

        let mut batch = OperationBatch::new();
        let updates = assignee_chat_updates(
            &ctx,
            &store,
            &AssigneeChatRequest {
                assignee_account_id: 7,
                assignee_email: "ana@example.com",
                task_report_id: "T1",
                parent_report_id: "R1",
                title: "demo",
                chat: &chat,
            },
            &mut batch,
        )
        .unwrap();
        assert_eq!(updates.created_action_id, None);

        store.apply_all(&batch.optimistic);
        store.apply_all(&batch.failure);
        let restored = store.get(&StoreKey::report("C1")).unwrap();
        assert_eq!(restored["lastMessageText"], "hello");
        assert!(restored.get("lastVisibleActionCreated").is_none());
        let actions = store.get(&StoreKey::report_actions("C1")).unwrap();
        let assigned = updates.assigned_action_id.unwrap();
        assert!(actions[assigned.as_str()].get("pendingAction").is_none());
    }
}
