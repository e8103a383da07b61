//! Turns raw mutation batches into engine signals.

use std::sync::Arc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

use crate::document::{
    Document, DocumentHandle, MutationBatch, MutationKind, MutationObserver, MutationRecord,
    ObserveOptions,
};
use crate::error::Result;
use crate::profile::HostProfile;

/// What a mutation batch means for the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSignals {
    pub has_new_messages: bool,
    pub has_conversation_change: bool,
}

impl BatchSignals {
    pub fn is_noise(&self) -> bool {
        !self.has_new_messages && !self.has_conversation_change
    }
}

pub fn classify_batch(doc: &Document, profile: &HostProfile, batch: &[MutationRecord]) -> BatchSignals {
    let mut signals = BatchSignals::default();

    for record in batch {
        for node in &record.added_nodes {
            if !signals.has_new_messages
                && (doc.matches(*node, &profile.message_marker)
                    || doc.query_selector(*node, &profile.message_marker).is_some())
            {
                signals.has_new_messages = true;
            }
            if !signals.has_conversation_change
                && HostProfile::matches_or_contains(doc, *node, &profile.header_change_markers)
            {
                signals.has_conversation_change = true;
            }
        }

        if record.kind == MutationKind::Attributes && profile.is_active_marker(doc, record.target) {
            signals.has_conversation_change = true;
        }

        if signals.has_new_messages && signals.has_conversation_change {
            break;
        }
    }

    signals
}

/// Trailing-edge debounce: fires `wait` after the last trigger.
///
/// A new trigger always replaces the pending deadline; deadlines never stack.
#[derive(Debug, Clone)]
pub struct Debouncer {
    wait: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            deadline: None,
        }
    }

    pub fn trigger(&mut self) {
        self.deadline = Some(Instant::now() + self.wait);
    }

    /// Like [`trigger`](Self::trigger) but with an extra settle delay in front of the window.
    pub fn trigger_after(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay + self.wait);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

/// Resolves at `deadline`, or never when there is none.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Remembers the navigation locator and reports when it moves.
#[derive(Debug, Clone, Default)]
pub struct NavigationWatcher {
    last: String,
}

impl NavigationWatcher {
    pub fn new(doc: &Document) -> Self {
        Self {
            last: doc.location().to_string(),
        }
    }

    pub fn check(&mut self, doc: &Document) -> bool {
        if doc.location() == self.last {
            return false;
        }
        self.last = doc.location().to_string();
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverEvent {
    Mutations(BatchSignals),
    NavigationChanged,
}

/// Observes the chat container, the sidebar and the navigation locator.
///
/// Dropping it detaches every subscription.
pub struct ChangeObserver {
    document: DocumentHandle,
    profile: Arc<HostProfile>,
    messages: MutationObserver,
    navigation: MutationObserver,
    watcher: NavigationWatcher,
}

impl ChangeObserver {
    pub fn attach(document: &DocumentHandle, profile: Arc<HostProfile>) -> Result<Self> {
        let messages = MutationObserver::new();
        let navigation = MutationObserver::new();

        let watcher = document.mutate(|doc| -> Result<NavigationWatcher> {
            let root = profile.observer_root(doc);
            doc.observe(
                &messages,
                root,
                ObserveOptions {
                    child_list: true,
                    attributes: true,
                    attribute_filter: Some(profile.observed_attributes.clone()),
                    subtree: true,
                    character_data: false,
                },
            )?;

            if let Some(sidebar) = profile.sidebar_root(doc) {
                doc.observe(
                    &messages,
                    sidebar,
                    ObserveOptions {
                        child_list: true,
                        subtree: true,
                        ..ObserveOptions::default()
                    },
                )?;
            }

            let body = doc.body();
            doc.observe(
                &navigation,
                body,
                ObserveOptions {
                    child_list: true,
                    ..ObserveOptions::default()
                },
            )?;

            debug!(target: "observer", root = root.as_u64(), "observer attached");
            Ok(NavigationWatcher::new(doc))
        })?;

        Ok(Self {
            document: document.clone(),
            profile,
            messages,
            navigation,
            watcher,
        })
    }

    /// Ids of the underlying subscriptions, for detaching from the document.
    pub fn subscription_ids(&self) -> [u64; 2] {
        [self.messages.id(), self.navigation.id()]
    }

    /// Waits for the next mutation batch or navigation change. Cancel-safe.
    pub async fn next_event(&mut self) -> ObserverEvent {
        loop {
            tokio::select! {
                Some(batch) = self.messages.next_batch() => {
                    let signals = self.classify(&batch);
                    return ObserverEvent::Mutations(signals);
                }
                Some(_) = self.navigation.next_batch() => {
                    if self.document.read(|doc| self.watcher.check(doc)) {
                        return ObserverEvent::NavigationChanged;
                    }
                }
            }
        }
    }

    fn classify(&self, batch: &MutationBatch) -> BatchSignals {
        self.document
            .read(|doc| classify_batch(doc, &self.profile, batch))
    }
}
