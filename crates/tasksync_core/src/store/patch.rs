//! Deep-merge patches with an explicit removal sentinel.
//!
//! A [`Patch`] is what a merge writes into an existing document. Objects
//! merge key by key, any other value replaces the leaf, and
//! [`Patch::Remove`] deletes the leaf it lands on. On the wire (and when
//! built from `serde_json::json!`) a JSON `null` means `Remove`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Patch {
    Remove,
    Set(Value),
    Merge(BTreeMap<String, Patch>),
}

impl Patch {
    pub fn merge() -> Self {
        Self::Merge(BTreeMap::new())
    }

    /// Adds or replaces one entry of a `Merge` patch. Non-merge patches are
    /// turned into an empty merge first.
    pub fn with<K: Into<String>, P: Into<Patch>>(mut self, key: K, patch: P) -> Self {
        if !matches!(self, Self::Merge(_)) {
            self = Self::merge();
        }
        if let Self::Merge(entries) = &mut self {
            entries.insert(key.into(), patch.into());
        }
        self
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove)
    }

    pub fn entry(&self, key: &str) -> Option<&Patch> {
        match self {
            Self::Merge(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Deep-merges this patch into `target`.
    ///
    /// `Remove` at the root turns the target into `null`; callers that own
    /// the key decide whether that means "delete the key".
    pub fn apply_to(&self, target: &mut Value) {
        match self {
            Self::Remove => *target = Value::Null,
            Self::Set(value) => *target = value.clone(),
            Self::Merge(entries) => {
                if !target.is_object() {
                    *target = Value::Object(Map::new());
                }
                if let Value::Object(object) = target {
                    for (key, patch) in entries {
                        if patch.is_remove() {
                            object.remove(key);
                            continue;
                        }
                        let slot = object.entry(key.clone()).or_insert(Value::Null);
                        patch.apply_to(slot);
                    }
                }
            }
        }
    }

    /// Materializes the patch as a document, dropping removal leaves.
    pub fn to_document(&self) -> Option<Value> {
        let mut value = Value::Null;
        self.apply_to(&mut value);
        if value.is_null() { None } else { Some(value) }
    }
}

impl From<Value> for Patch {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Remove,
            Value::Object(object) => Self::Merge(
                object
                    .into_iter()
                    .map(|(key, value)| (key, Patch::from(value)))
                    .collect(),
            ),
            other => Self::Set(other),
        }
    }
}

impl From<Patch> for Value {
    fn from(patch: Patch) -> Self {
        match patch {
            Patch::Remove => Value::Null,
            Patch::Set(value) => value,
            Patch::Merge(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(key, patch)| (key, Value::from(patch)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Patch {
    fn from(value: &str) -> Self {
        Self::Set(Value::String(value.to_string()))
    }
}

impl From<String> for Patch {
    fn from(value: String) -> Self {
        Self::Set(Value::String(value))
    }
}

impl From<bool> for Patch {
    fn from(value: bool) -> Self {
        Self::Set(Value::Bool(value))
    }
}

impl From<u64> for Patch {
    fn from(value: u64) -> Self {
        Self::Set(Value::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::Patch;
    use serde_json::json;

    #[test]
    fn null_leaf_removes_field() {
        let mut doc = json!({"title": "A", "pendingFields": {"reportName": "update"}});
        Patch::from(json!({"pendingFields": {"reportName": null}})).apply_to(&mut doc);

        assert_eq!(doc, json!({"title": "A", "pendingFields": {}}));
    }

    #[test]
    fn merge_into_missing_object_creates_it() {
        let mut doc = json!({"title": "A"});
        Patch::from(json!({"errorFields": {"createTask": {"1": "task.error"}}})).apply_to(&mut doc);

        assert_eq!(doc["errorFields"]["createTask"]["1"], "task.error");
        assert_eq!(doc["title"], "A");
    }

    #[test]
    fn arrays_replace_instead_of_merging() {
        let mut doc = json!({"participantAccountIDs": [1, 2]});
        Patch::from(json!({"participantAccountIDs": [3]})).apply_to(&mut doc);

        assert_eq!(doc["participantAccountIDs"], json!([3]));
    }

    #[test]
    fn scalar_target_is_replaced_by_merge() {
        let mut doc = json!("tombstone");
        Patch::from(json!({"a": 1})).apply_to(&mut doc);

        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn to_document_drops_removal_leaves() {
        let patch = Patch::merge().with("a", "x").with("b", Patch::Remove);

        assert_eq!(patch.to_document(), Some(json!({"a": "x"})));
        assert_eq!(Patch::Remove.to_document(), None);
    }

    #[test]
    fn wire_form_uses_null_for_remove() {
        let patch = Patch::merge().with("pendingAction", Patch::Remove);
        let wire = serde_json::to_value(&patch).unwrap();
        assert_eq!(wire, json!({"pendingAction": null}));

        let back: Patch = serde_json::from_value(wire).unwrap();
        assert_eq!(back, patch);
    }
}
