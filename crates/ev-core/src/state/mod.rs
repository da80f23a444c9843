//! Hierarchical, observable state store
//!
//! Values live in a JSON tree addressed by path segments. Subscribers watch
//! a path prefix and are told about every change at or below it. A single
//! re-entrant lock guards reads, writes and notification, so a callback may
//! freely read or write the store it is observing.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use ahash::{AHashMap, AHashSet};
use parking_lot::ReentrantMutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{error, warn};

/// Callback invoked with the full changed path and the new value
pub type StateCallback = Arc<dyn Fn(&[String], &Value) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: StateCallback,
}

struct StateInner {
    tree: Value,
    subscribers: AHashMap<Vec<String>, Vec<Subscriber>>,
    next_id: u64,
}

type Shared = ReentrantMutex<RefCell<StateInner>>;

/// Process-wide configuration and signalling store
pub struct StateStore {
    inner: Arc<Shared>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(StateInner {
                tree: Value::Object(Map::new()),
                subscribers: AHashMap::new(),
                next_id: 0,
            }))),
        }
    }

    /// Value at `path`, or `default` when any segment is missing
    pub fn get(&self, path: &[&str], default: Value) -> Value {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        lookup(&inner.tree, path).cloned().unwrap_or(default)
    }

    /// Typed read; falls back to `default` when missing or of the wrong shape
    pub fn get_as<T: DeserializeOwned>(&self, path: &[&str], default: T) -> T {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        lookup(&inner.tree, path)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    pub fn contains(&self, path: &[&str]) -> bool {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        lookup(&inner.tree, path).is_some()
    }

    /// Store `value` at `path`, creating intermediate levels.
    ///
    /// Subscribers are notified only when the stored value actually changed.
    /// Returns whether it changed. An empty path is ignored.
    pub fn set(&self, path: &[&str], value: impl Into<Value>) -> bool {
        if path.is_empty() {
            return false;
        }
        let value = value.into();

        let guard = self.inner.lock();
        let callbacks = {
            let mut inner = guard.borrow_mut();
            let old = insert(&mut inner.tree, path, value.clone());
            if old.as_ref() == Some(&value) {
                return false;
            }
            inner.callbacks_for(path)
        };

        // The RefCell borrow is released so callbacks can re-enter.
        let full_path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        for callback in callbacks {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(&full_path, &value)));
            if outcome.is_err() {
                error!("Error in state subscriber callback for {}", full_path.join("/"));
            }
        }
        drop(guard);
        true
    }

    /// Store `value` only if nothing is present at `path` yet
    pub fn set_default(&self, path: &[&str], value: impl Into<Value>) -> bool {
        let _guard = self.inner.lock();
        if self.contains(path) {
            return false;
        }
        self.set(path, value)
    }

    /// Set every key of `updates` below `prefix`
    pub fn update(&self, prefix: &[&str], updates: Map<String, Value>) {
        let _guard = self.inner.lock();
        for (key, value) in updates {
            let mut path = prefix.to_vec();
            path.push(key.as_str());
            self.set(&path, value);
        }
    }

    /// Watch `path` and everything below it.
    ///
    /// The empty path observes every change.
    pub fn subscribe<F>(&self, path: &[&str], callback: F) -> Subscription
    where
        F: Fn(&[String], &Value) + Send + Sync + 'static,
    {
        self.subscribe_shared(path, Arc::new(callback))
    }

    /// Like [`subscribe`](Self::subscribe) for an already shared callback.
    ///
    /// Registering the same callback at several overlapping paths still
    /// yields one invocation per change.
    pub fn subscribe_shared(&self, path: &[&str], callback: StateCallback) -> Subscription {
        let key: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber { id, callback });

        Subscription {
            store: Arc::downgrade(&self.inner),
            path: key,
            id,
        }
    }

    /// Deep copy of the whole tree
    pub fn snapshot(&self) -> Value {
        let guard = self.inner.lock();
        let tree = guard.borrow().tree.clone();
        tree
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateInner {
    /// Distinct callbacks watching `path` or one of its prefixes
    fn callbacks_for(&self, path: &[&str]) -> Vec<StateCallback> {
        let mut seen = AHashSet::new();
        let mut callbacks = Vec::new();
        for depth in 0..=path.len() {
            let prefix: Vec<String> = path[..depth].iter().map(|s| s.to_string()).collect();
            let Some(subscribers) = self.subscribers.get(&prefix) else {
                continue;
            };
            for subscriber in subscribers {
                let identity = Arc::as_ptr(&subscriber.callback) as *const () as usize;
                if seen.insert(identity) {
                    callbacks.push(Arc::clone(&subscriber.callback));
                }
            }
        }
        callbacks
    }
}

/// Handle returned by [`StateStore::subscribe`].
///
/// Dropping the handle leaves the callback registered; only
/// [`unsubscribe`](Self::unsubscribe) removes it.
#[must_use = "the callback stays registered until `unsubscribe` is called"]
pub struct Subscription {
    store: Weak<Shared>,
    path: Vec<String>,
    id: u64,
}

impl Subscription {
    /// Stop receiving notifications
    pub fn unsubscribe(self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let guard = store.lock();
        let mut inner = guard.borrow_mut();
        if let Some(subscribers) = inner.subscribers.get_mut(&self.path) {
            subscribers.retain(|s| s.id != self.id);
            if subscribers.is_empty() {
                inner.subscribers.remove(&self.path);
            }
        }
    }
}

fn lookup<'a>(tree: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(tree, |node, key| node.get(*key))
}

/// Insert `value` at `path`, returning the previous value if any
fn insert(tree: &mut Value, path: &[&str], value: Value) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut node = tree;
    for key in parents {
        let map = as_object_mut(node, key);
        node = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    as_object_mut(node, last).insert(last.to_string(), value)
}

fn as_object_mut<'a>(node: &'a mut Value, key: &str) -> &'a mut Map<String, Value> {
    if !node.is_object() {
        warn!("Replacing non-object state value while setting '{}'", key);
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    type Calls = Arc<Mutex<Vec<(Vec<String>, Value)>>>;

    fn recorder() -> (Calls, impl Fn(&[String], &Value) + Send + Sync + 'static) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, move |path: &[String], value: &Value| {
            sink.lock().push((path.to_vec(), value.clone()))
        })
    }

    const SIZE: [&str; 4] = ["plotters", "X", "options", "size"];

    #[test]
    fn test_get_returns_default_when_missing() {
        let store = StateStore::new();
        assert_eq!(store.get(&SIZE, json!(1)), json!(1));
        assert_eq!(store.get_as(&SIZE, 1u32), 1);
    }

    #[test]
    fn test_set_then_get_and_notify_once() {
        let store = StateStore::new();
        let (calls, callback) = recorder();
        let _sub = store.subscribe(&["plotters", "X"], callback);

        assert!(store.set(&SIZE, 3));
        assert_eq!(store.get(&SIZE, json!(1)), json!(3));
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(
            calls.lock()[0],
            (SIZE.iter().map(|s| s.to_string()).collect(), json!(3))
        );

        assert!(!store.set(&SIZE, 3));
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_unrelated_paths_do_not_notify() {
        let store = StateStore::new();
        let (calls, callback) = recorder();
        let _sub = store.subscribe(&["plotters", "Y"], callback);

        store.set(&SIZE, 3);
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_shared_callback_at_overlapping_prefixes_fires_once() {
        let store = StateStore::new();
        let (calls, callback) = recorder();
        let shared: StateCallback = Arc::new(callback);
        let _a = store.subscribe_shared(&["plotters"], Arc::clone(&shared));
        let _b = store.subscribe_shared(&SIZE, Arc::clone(&shared));
        let (other_calls, other) = recorder();
        let _c = store.subscribe(&[], other);

        store.set(&SIZE, 5);
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(other_calls.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let store = StateStore::new();
        let (calls, callback) = recorder();
        let sub = store.subscribe(&["io"], callback);

        store.set(&["io", "current_entry"], 1);
        sub.unsubscribe();
        store.set(&["io", "current_entry"], 2);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_dropped_handle_keeps_callback() {
        let store = StateStore::new();
        let (calls, callback) = recorder();
        drop(store.subscribe(&["io"], callback));

        store.set(&["io", "current_entry"], 1);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_callback_may_reenter_store() {
        let store = Arc::new(StateStore::new());
        let inner = Arc::clone(&store);
        let _sub = store.subscribe(&["io", "current_entry"], move |_, value| {
            let doubled = value.as_i64().unwrap_or(0) * 2;
            let seen = inner.get(&["io", "current_entry"], Value::Null);
            inner.set(&["derived", "double"], doubled);
            inner.set(&["derived", "seen"], seen);
        });

        store.set(&["io", "current_entry"], 21);
        assert_eq!(store.get(&["derived", "double"], Value::Null), json!(42));
        assert_eq!(store.get(&["derived", "seen"], Value::Null), json!(21));
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let store = StateStore::new();
        let _bad = store.subscribe(&["io"], |_, _| panic!("subscriber bug"));
        let (calls, callback) = recorder();
        let _good = store.subscribe(&["io"], callback);

        assert!(store.set(&["io", "total_entries"], 10));
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(store.get(&["io", "total_entries"], Value::Null), json!(10));
    }

    #[test]
    fn test_set_default_does_not_clobber() {
        let store = StateStore::new();
        store.set(&SIZE, 7);
        assert!(!store.set_default(&SIZE, 3));
        assert!(store.set_default(&["plotters", "X", "options", "color"], "red"));
        assert_eq!(store.get(&SIZE, Value::Null), json!(7));
    }

    #[test]
    fn test_update_and_snapshot() {
        let store = StateStore::new();
        let mut updates = Map::new();
        updates.insert("a".to_string(), json!(1));
        updates.insert("b".to_string(), json!([1, 2]));
        store.update(&["io"], updates);

        assert_eq!(store.snapshot(), json!({"io": {"a": 1, "b": [1, 2]}}));
    }

    #[test]
    fn test_scalar_intermediate_is_replaced() {
        let store = StateStore::new();
        store.set(&["io"], 5);
        store.set(&["io", "current_entry"], 0);
        assert_eq!(store.get(&["io", "current_entry"], Value::Null), json!(0));
        assert!(!store.set(&[], 1));
    }
}
