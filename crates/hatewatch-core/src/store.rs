//! Per-session memory of classification verdicts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::identity::{ConversationIdentity, MessageIdentity};
use crate::state::Verdict;

/// Key of the verdict store: the same message id in two conversations
/// never shares a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    pub conversation: ConversationIdentity,
    pub message: MessageIdentity,
}

impl CompositeKey {
    pub fn new(conversation: ConversationIdentity, message: MessageIdentity) -> Self {
        Self {
            conversation,
            message,
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.conversation, self.message)
    }
}

/// Single source of truth for "already classified".
///
/// Grows without bound for the session; [`VerdictStore::clear`] is the only
/// reclamation path.
#[derive(Debug, Default)]
pub struct VerdictStore {
    entries: Mutex<HashMap<CompositeKey, Verdict>>,
}

impl VerdictStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CompositeKey, Verdict>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CompositeKey) -> Option<Verdict> {
        self.lock().get(key).cloned()
    }

    pub fn has(&self, key: &CompositeKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Stores the verdict for `key`. The first verdict stored for a key is
    /// kept until [`clear`](Self::clear); returns whether this call stored it.
    pub fn put(&self, key: CompositeKey, verdict: Verdict) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, verdict);
        true
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[cfg(test)]
    fn count_for(&self, conversation: &ConversationIdentity) -> usize {
        self.lock()
            .keys()
            .filter(|k| &k.conversation == conversation)
            .count()
    }
}
