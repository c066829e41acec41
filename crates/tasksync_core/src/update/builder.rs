use super::OperationBatch;
use crate::error::AppError;
use crate::model::{ErrorMap, PendingAction, ReportAction, encode};
use crate::store::{Patch, StoreKey, StoreOp};
use serde_json::Value;

pub(crate) const PENDING_FIELDS: &str = "pendingFields";
pub(crate) const ERROR_FIELDS: &str = "errorFields";
pub(crate) const PENDING_ACTION: &str = "pendingAction";
pub(crate) const IS_OPTIMISTIC_REPORT: &str = "isOptimisticReport";

/// What the failure sequence does to a freshly created document.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateFailure {
    /// Keep the document, clear its markers and record the error under
    /// `errorFields.<operation>`.
    Error { operation: String, error: ErrorMap },
    /// Delete the document entirely.
    Remove,
}

/// What the failure sequence does to an appended activity record.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionFailure {
    /// Null the record out.
    Remove,
    /// Only clear `pendingAction`.
    Clear,
    /// Clear `pendingAction` and attach the error descriptor.
    Error(ErrorMap),
}

/// One field written by [`mutate_fields`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub name: String,
    pub value: Value,
    pub mark_pending: bool,
}

impl FieldChange {
    /// A change that sets `pendingFields.<name> = update` while in flight.
    pub fn marked<N: Into<String>, V: Into<Value>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            mark_pending: true,
        }
    }

    pub fn unmarked<N: Into<String>, V: Into<Value>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            mark_pending: false,
        }
    }
}

pub(crate) fn error_patch(error: &ErrorMap) -> Patch {
    error
        .iter()
        .fold(Patch::merge(), |patch, (stamp, key)| patch.with(stamp.clone(), key.as_str()))
}

/// Leaf write: objects and arrays replace wholesale, `null` removes.
fn leaf(value: Value) -> Patch {
    match value {
        Value::Null => Patch::Remove,
        other => Patch::Set(other),
    }
}

fn markers<'a>(fields: impl IntoIterator<Item = &'a str>, marker: Option<PendingAction>) -> Patch {
    fields.into_iter().fold(Patch::merge(), |patch, field| match marker {
        Some(action) => patch.with(field, action.as_str()),
        None => patch.with(field, Patch::Remove),
    })
}

/// Full replace of a new document with `pendingFields.<f> = add` for each
/// of `new_fields` and `isOptimisticReport = true`.
pub fn create_entity(
    key: StoreKey,
    document: Value,
    new_fields: &[&str],
    on_failure: CreateFailure,
) -> OperationBatch {
    let pending = markers(new_fields.iter().copied(), Some(PendingAction::Add));
    let cleared = markers(new_fields.iter().copied(), None);
    let optimistic = Patch::from(document)
        .with(PENDING_FIELDS, pending)
        .with(IS_OPTIMISTIC_REPORT, true);

    let mut batch = OperationBatch::new();
    batch.push_optimistic(StoreOp::replace(key.clone(), Value::from(optimistic)));
    batch.push_success(StoreOp::merge(
        key.clone(),
        Patch::merge()
            .with(PENDING_FIELDS, cleared.clone())
            .with(IS_OPTIMISTIC_REPORT, false),
    ));
    match on_failure {
        CreateFailure::Error { operation, error } => batch.push_failure(StoreOp::merge(
            key,
            Patch::merge()
                .with(PENDING_FIELDS, cleared)
                .with(ERROR_FIELDS, Patch::merge().with(operation, error_patch(&error))),
        )),
        CreateFailure::Remove => batch.push_failure(StoreOp::remove(key)),
    }
    batch
}

/// Deep merge of new field values. Prior values are captured from
/// `snapshot` before anything is applied and restored on failure.
pub fn mutate_fields(
    key: StoreKey,
    snapshot: Option<&Value>,
    changes: Vec<FieldChange>,
) -> OperationBatch {
    let mut optimistic = Patch::merge();
    let mut restore = Patch::merge();
    let mut marked = Vec::new();

    for change in changes {
        let prior = snapshot
            .and_then(|document| document.get(&change.name))
            .cloned()
            .map(leaf)
            .unwrap_or(Patch::Remove);
        if change.mark_pending {
            marked.push(change.name.clone());
        }
        restore = restore.with(change.name.clone(), prior);
        optimistic = optimistic.with(change.name, leaf(change.value));
    }

    let mut batch = OperationBatch::new();
    if !marked.is_empty() {
        let cleared = markers(marked.iter().map(String::as_str), None);
        optimistic = optimistic.with(
            PENDING_FIELDS,
            markers(marked.iter().map(String::as_str), Some(PendingAction::Update)),
        );
        restore = restore.with(PENDING_FIELDS, cleared.clone());
        batch.push_success(StoreOp::merge(
            key.clone(),
            Patch::merge().with(PENDING_FIELDS, cleared),
        ));
    }
    batch.push_optimistic(StoreOp::merge(key.clone(), optimistic));
    batch.push_failure(StoreOp::merge(key, restore));
    batch
}

/// Unmarked preview fields (last message, last actor, ...) with their prior
/// values restored on failure.
pub fn restore_fields(key: StoreKey, snapshot: Option<&Value>, fields: Vec<(&str, Value)>) -> OperationBatch {
    let changes = fields
        .into_iter()
        .map(|(name, value)| FieldChange::unmarked(name, value))
        .collect();
    mutate_fields(key, snapshot, changes)
}

/// Inserts one activity record under `reportActions_<report_id>`.
pub fn append_action(
    report_id: &str,
    action: &ReportAction,
    on_failure: ActionFailure,
) -> Result<OperationBatch, AppError> {
    let key = StoreKey::report_actions(report_id);
    let id = action.report_action_id.clone();
    let record = encode(action)?;
    let cleared = Patch::merge().with(PENDING_ACTION, Patch::Remove);

    let mut batch = OperationBatch::new();
    batch.push_optimistic(StoreOp::merge(
        key.clone(),
        Patch::merge().with(id.clone(), Patch::Set(record)),
    ));
    batch.push_success(StoreOp::merge(
        key.clone(),
        Patch::merge().with(id.clone(), cleared.clone()),
    ));
    let failure = match on_failure {
        ActionFailure::Remove => Patch::Remove,
        ActionFailure::Clear => cleared,
        ActionFailure::Error(error) => cleared.with("errors", error_patch(&error)),
    };
    batch.push_failure(StoreOp::merge(key, Patch::merge().with(id, failure)));
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::{
        ActionFailure, CreateFailure, FieldChange, append_action, create_entity, mutate_fields,
        restore_fields,
    };
    use crate::model::{ActionName, ErrorMap, MessageFragment, ReportAction};
    use crate::store::{EntityStore, MemoryStore, StoreKey};
    use serde_json::json;

    fn error() -> ErrorMap {
        ErrorMap::from([("1700000000000000".to_string(), "task.messages.error".to_string())])
    }

    fn action(id: &str) -> ReportAction {
        ReportAction::new(
            id.into(),
            1,
            "2025-12-20 00:00:00.000".into(),
            ActionName::TaskCompleted,
            vec![MessageFragment::text("marked as complete")],
        )
    }

    #[test]
    fn create_entity_marks_new_fields_and_clears_on_success() {
        let key = StoreKey::report("T1");
        let batch = create_entity(
            key.clone(),
            json!({"reportID": "T1", "reportName": "Ship report"}),
            &["reportName", "description"],
            CreateFailure::Error {
                operation: "createTask".into(),
                error: error(),
            },
        );
        let store = MemoryStore::new();

        store.apply_all(&batch.optimistic);
        let optimistic = store.get(&key).unwrap();
        assert_eq!(optimistic["pendingFields"]["reportName"], "add");
        assert_eq!(optimistic["pendingFields"]["description"], "add");
        assert_eq!(optimistic["isOptimisticReport"], true);

        store.apply_all(&batch.success);
        let confirmed = store.get(&key).unwrap();
        assert_eq!(confirmed["pendingFields"], json!({}));
        assert_eq!(confirmed["isOptimisticReport"], false);
        assert_eq!(confirmed["reportName"], "Ship report");
    }

    #[test]
    fn create_entity_failure_attaches_error_or_removes() {
        let key = StoreKey::report("T1");
        let keep = create_entity(
            key.clone(),
            json!({"reportID": "T1"}),
            &["reportName"],
            CreateFailure::Error {
                operation: "createTask".into(),
                error: error(),
            },
        );
        let store = MemoryStore::new();
        store.apply_all(&keep.optimistic);
        store.apply_all(&keep.failure);
        let failed = store.get(&key).unwrap();
        assert_eq!(failed["pendingFields"], json!({}));
        assert_eq!(
            failed["errorFields"]["createTask"]["1700000000000000"],
            "task.messages.error"
        );

        let discarded = create_entity(key.clone(), json!({"reportID": "T1"}), &[], CreateFailure::Remove);
        store.apply_all(&discarded.optimistic);
        store.apply_all(&discarded.failure);
        assert_eq!(store.get(&key), None);
    }

    #[test]
    fn mutate_fields_restores_prior_values() {
        let key = StoreKey::report("T1");
        let store = MemoryStore::new();
        store.replace(&key, Some(json!({"reportName": "A"})));
        let snapshot = store.get(&key);

        let batch = mutate_fields(
            key.clone(),
            snapshot.as_ref(),
            vec![
                FieldChange::marked("reportName", "B"),
                FieldChange::unmarked("description", "new"),
            ],
        );
        store.apply_all(&batch.optimistic);
        let optimistic = store.get(&key).unwrap();
        assert_eq!(optimistic["reportName"], "B");
        assert_eq!(optimistic["pendingFields"], json!({"reportName": "update"}));

        store.apply_all(&batch.failure);
        assert_eq!(store.get(&key).unwrap(), json!({"reportName": "A", "pendingFields": {}}));
    }

    #[test]
    fn mutate_fields_without_markers_has_no_success_op() {
        let batch = restore_fields(
            StoreKey::report("R1"),
            None,
            vec![("lastMessageText", json!("hi"))],
        );

        assert!(batch.success.is_empty());
        assert_eq!(batch.failure.len(), 1);
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn success_applied_twice_is_idempotent() {
        let key = StoreKey::report("T1");
        let store = MemoryStore::new();
        store.replace(&key, Some(json!({"reportName": "A"})));
        let snapshot = store.get(&key);
        let batch = mutate_fields(key.clone(), snapshot.as_ref(), vec![FieldChange::marked("reportName", "B")]);

        store.apply_all(&batch.optimistic);
        store.apply_all(&batch.success);
        let once = store.get(&key);
        store.apply_all(&batch.success);

        assert_eq!(store.get(&key), once);
    }

    #[test]
    fn append_action_failure_modes() {
        let store = MemoryStore::new();
        let key = StoreKey::report_actions("T1");

        let removed = append_action("T1", &action("a1"), ActionFailure::Remove).unwrap();
        store.apply_all(&removed.optimistic);
        assert_eq!(store.get(&key).unwrap()["a1"]["pendingAction"], "add");
        store.apply_all(&removed.failure);
        assert!(store.get(&key).unwrap().get("a1").is_none());

        let cleared = append_action("T1", &action("a2"), ActionFailure::Clear).unwrap();
        store.apply_all(&cleared.optimistic);
        store.apply_all(&cleared.failure);
        let record = &store.get(&key).unwrap()["a2"];
        assert!(record.get("pendingAction").is_none());
        assert!(record.get("errors").is_none());

        let errored = append_action("T1", &action("a3"), ActionFailure::Error(error())).unwrap();
        store.apply_all(&errored.optimistic);
        store.apply_all(&errored.failure);
        let record = &store.get(&key).unwrap()["a3"];
        assert!(record.get("pendingAction").is_none());
        assert_eq!(record["errors"]["1700000000000000"], "task.messages.error");
    }
}
