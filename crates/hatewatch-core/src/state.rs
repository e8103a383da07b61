//! Host-agnostic state types
//!
//! Shared between the engine components and whatever surface drives them
//! (the CLI bridge, tests, an embedding host).

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration, Instant};

use crate::identity::ConversationIdentity;

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_flagged: bool,
    pub suggestion: Option<String>,
    pub confidence: Option<f64>,
}

impl Verdict {
    pub fn clean() -> Self {
        Self {
            is_flagged: false,
            suggestion: None,
            confidence: None,
        }
    }

    pub fn flagged(suggestion: Option<String>, confidence: Option<f64>) -> Self {
        Self {
            is_flagged: true,
            suggestion,
            confidence,
        }
    }
}

/// Lifecycle state owned by the session controller.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub active: bool,
    /// Bumped on every start and stop; work begun under an older
    /// generation must not touch the store or the document.
    pub generation: u64,
    pub current_conversation: ConversationIdentity,
    pub last_activity: Instant,
}

/// Cloneable shared access to the [`SessionState`].
#[derive(Debug, Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                active: false,
                generation: 0,
                current_conversation: ConversationIdentity::fallback(),
                last_activity: Instant::now(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Active and still in the generation that started the work.
    pub fn is_current(&self, generation: u64) -> bool {
        let state = self.lock();
        state.active && state.generation == generation
    }

    pub fn current_conversation(&self) -> ConversationIdentity {
        self.lock().current_conversation.clone()
    }

    pub fn touch(&self) {
        self.lock().last_activity = Instant::now();
    }

    pub fn quiet_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    pub(crate) fn activate(&self, conversation: ConversationIdentity) -> u64 {
        let mut state = self.lock();
        state.active = true;
        state.generation += 1;
        state.current_conversation = conversation;
        state.last_activity = Instant::now();
        state.generation
    }

    pub(crate) fn deactivate(&self) {
        let mut state = self.lock();
        state.active = false;
        state.generation += 1;
    }

    /// Records `conversation` as current. Returns the previous one if it changed.
    pub(crate) fn switch_conversation(
        &self,
        conversation: ConversationIdentity,
    ) -> Option<ConversationIdentity> {
        let mut state = self.lock();
        if state.current_conversation == conversation {
            return None;
        }
        state.last_activity = Instant::now();
        Some(std::mem::replace(&mut state.current_conversation, conversation))
    }
}

impl Default for SharedSession {
    fn default() -> Self {
        Self::new()
    }
}
