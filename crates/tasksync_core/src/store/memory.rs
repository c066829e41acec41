use super::{EntityStore, Patch, StoreKey};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type Listener = Arc<dyn Fn(&StoreKey, Option<&Value>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// In-process entity store.
///
/// Documents live behind a `RwLock`; listeners are invoked after the lock
/// is released so they may read the store again.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<StoreKey, Value>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<StoreKey, Value>) -> Self {
        Self {
            entities: RwLock::new(entries),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> BTreeMap<StoreKey, Value> {
        self.read(|entities| entities.clone())
    }

    pub fn len(&self) -> usize {
        self.read(|entities| entities.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreKey, Option<&Value>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.with_listeners(|listeners| listeners.push((id, Arc::new(listener))));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.with_listeners(|listeners| listeners.retain(|(existing, _)| *existing != id));
    }

    fn read<R>(&self, f: impl FnOnce(&BTreeMap<StoreKey, Value>) -> R) -> R {
        match self.entities.read() {
            Ok(entities) => f(&entities),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut BTreeMap<StoreKey, Value>) -> R) -> R {
        match self.entities.write() {
            Ok(mut entities) => f(&mut entities),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn with_listeners<R>(&self, f: impl FnOnce(&mut Vec<(SubscriptionId, Listener)>) -> R) -> R {
        match self.listeners.lock() {
            Ok(mut listeners) => f(&mut listeners),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn notify(&self, key: &StoreKey, value: Option<&Value>) {
        let listeners: Vec<Listener> =
            self.with_listeners(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect());
        for listener in listeners {
            listener(key, value);
        }
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, key: &StoreKey) -> Option<Value> {
        self.read(|entities| entities.get(key).cloned())
    }

    fn keys(&self) -> Vec<StoreKey> {
        self.read(|entities| entities.keys().cloned().collect())
    }

    fn replace(&self, key: &StoreKey, value: Option<Value>) {
        let value = value.filter(|value| !value.is_null());
        tracing::trace!(%key, present = value.is_some(), "store replace");
        self.write(|entities| match value.clone() {
            Some(value) => {
                entities.insert(key.clone(), value);
            }
            None => {
                entities.remove(key);
            }
        });
        self.notify(key, value.as_ref());
    }

    fn merge(&self, key: &StoreKey, patch: &Patch) {
        tracing::trace!(%key, "store merge");
        let merged = self.write(|entities| {
            if patch.is_remove() {
                entities.remove(key);
                return None;
            }
            let slot = entities.entry(key.clone()).or_insert(Value::Null);
            patch.apply_to(slot);
            Some(slot.clone())
        });
        self.notify(key, merged.as_ref());
    }
}
