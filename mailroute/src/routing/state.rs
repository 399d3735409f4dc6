//! In-memory conversation state.
//!
//! Maps a conversation key (normally the sender address) to the name of the
//! state that conversation is in. Unseen keys are in [`START_STATE`]. Nothing
//! is persisted: after a restart every conversation resumes from `START`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State every conversation begins in.
pub const START_STATE: &str = "START";

/// Process-wide conversation state with per-key serialization.
#[derive(Debug, Default)]
pub struct StateStore {
    states: Mutex<HashMap<String, String>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for `key`, `START` if never set.
    pub fn get_state(&self, key: &str) -> String {
        lock(&self.states)
            .get(key)
            .cloned()
            .unwrap_or_else(|| START_STATE.to_string())
    }

    pub fn set_state(&self, key: &str, state: &str) {
        lock(&self.states).insert(key.to_string(), state.to_string());
    }

    /// Forget every conversation. Idempotent.
    pub fn clear_all(&self) {
        lock(&self.states).clear();
    }

    /// Number of conversations that have left the implicit `START` default.
    pub fn len(&self) -> usize {
        lock(&self.states).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// Calls for the same key run one at a time in arrival order of the lock;
    /// calls for different keys only contend on the short map lookup.
    pub fn with_key_locked<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let key_lock = {
            let mut locks = lock(&self.key_locks);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let result = {
            let _guard = lock(&*key_lock);
            f()
        };

        // Drop the entry once nobody else holds or waits on it. Clones are only
        // taken under the map lock, so the count check is race-free.
        let mut locks = lock(&self.key_locks);
        drop(key_lock);
        if locks.get(key).map(Arc::strong_count) == Some(1) {
            locks.remove(key);
        }

        result
    }
}

/// Derive the default conversation key from a sender address.
pub fn conversation_key(sender: &str) -> String {
    sender.trim().to_ascii_lowercase()
}

// Guarded maps are always left consistent, so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
