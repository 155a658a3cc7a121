//! Per-worker execution context.
//!
//! Every worker thread owns a private key/value store that helpers reach
//! without a handle being threaded through them. The store lives in
//! thread-local storage, so it is partitioned by construction and never
//! locked. The only state shared between workers is the unique id counter.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Well-known store keys.
pub mod keys {
    /// Per-test actor identity written by [`super::create_unique_user`].
    pub const CURRENT_USER: &str = "current_user";
    /// Identity of the test currently running on this worker.
    pub const TEST_ID: &str = "test_id";
    /// Correlation id derived from the test identity.
    pub const CORRELATION_ID: &str = "correlation_id";
}

thread_local! {
    static STORE: RefCell<HashMap<String, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

static COUNTER: OnceLock<AtomicU64> = OnceLock::new();

fn counter() -> &'static AtomicU64 {
    COUNTER.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        AtomicU64::new(seed)
    })
}

/// Store `value` under `key` in the calling worker's store, replacing any previous value.
pub fn set_data<T: Any>(key: impl Into<String>, value: T) {
    STORE.with(|store| {
        store.borrow_mut().insert(key.into(), Box::new(value));
    });
}

/// Returns a clone of the calling worker's value for `key`.
///
/// `None` when the key was never set on this worker, or when it holds a
/// value of a different type.
pub fn get_data<T: Any + Clone>(key: &str) -> Option<T> {
    STORE.with(|store| {
        store
            .borrow()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    })
}

/// Removes and returns the calling worker's value for `key`.
///
/// A value of a different type is left in place.
pub fn take_data<T: Any>(key: &str) -> Option<T> {
    STORE.with(|store| {
        let mut store = store.borrow_mut();
        if !store.get(key).is_some_and(|value| value.is::<T>()) {
            return None;
        }
        store
            .remove(key)
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    })
}

/// True when the calling worker has a value under `key`.
pub fn contains_key(key: &str) -> bool {
    STORE.with(|store| store.borrow().contains_key(key))
}

/// Number of entries in the calling worker's store.
pub fn len() -> usize {
    STORE.with(|store| store.borrow().len())
}

/// Process-wide unique, strictly increasing id.
///
/// Seeded from wall-clock milliseconds on first use; unique within one
/// process lifetime, and across restarts only at the seed's resolution.
pub fn generate_unique_id() -> u64 {
    counter().fetch_add(1, Ordering::SeqCst) + 1
}

/// Name of the calling worker, for diagnostics.
pub fn worker_name() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}

/// Compose `prefix_<unique id>` and store it under [`keys::CURRENT_USER`].
pub fn create_unique_user(prefix: &str) -> String {
    let username = format!("{}_{}", prefix, generate_unique_id());
    set_data(keys::CURRENT_USER, username.clone());
    info!(worker = %worker_name(), user = %username, "created unique user");
    username
}

/// The calling worker's current user, if one was created.
pub fn current_user() -> Option<String> {
    get_data(keys::CURRENT_USER)
}

/// Discard the calling worker's entire store. Safe to call on an empty store.
pub fn cleanup() {
    let dropped = STORE.with(|store| {
        let mut store = store.borrow_mut();
        let dropped = store.len();
        store.clear();
        dropped
    });
    debug!(worker = %worker_name(), entries = dropped, "execution context cleared");
}
