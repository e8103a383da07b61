//! The sweep over message candidates.
//!
//! Repeated scans over an unchanged document do no network work: every
//! identity already in the verdict store is answered from the store, and
//! only unseen identities reach the classifier, one call at a time in
//! document order.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::annotate::AnnotationManager;
use crate::classifier::{Classification, Classifier};
use crate::document::{DocumentHandle, NodeId};
use crate::identity::{ConversationIdentity, IdentityResolver};
use crate::state::{SharedSession, Verdict};
use crate::store::{CompositeKey, VerdictStore};

/// Texts shorter than this (after trimming) are never sent for classification.
pub const MIN_TEXT_CHARS: usize = 2;

/// What one scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub candidates: usize,
    pub already_annotated: usize,
    pub cache_hits: usize,
    /// Annotations restored from cached flagged verdicts
    pub reapplied: usize,
    pub classified: usize,
    pub flagged: usize,
    pub unavailable: usize,
    pub skipped_empty: usize,
    /// The session stopped while the scan ran; remaining work was dropped
    pub discarded: bool,
}

impl ScanReport {
    pub fn network_calls(&self) -> usize {
        self.classified + self.unavailable
    }
}

enum Step {
    Gone,
    Annotated,
    Cached(Verdict),
    Classify(CompositeKey, String),
}

pub fn is_classifiable(text: &str) -> bool {
    text.trim().chars().count() >= MIN_TEXT_CHARS
}

pub struct ScanCoordinator {
    document: DocumentHandle,
    resolver: IdentityResolver,
    store: Arc<VerdictStore>,
    classifier: Arc<dyn Classifier>,
    annotator: AnnotationManager,
    session: SharedSession,
    running: AsyncMutex<()>,
}

impl ScanCoordinator {
    pub fn new(
        document: DocumentHandle,
        resolver: IdentityResolver,
        store: Arc<VerdictStore>,
        classifier: Arc<dyn Classifier>,
        annotator: AnnotationManager,
        session: SharedSession,
    ) -> Self {
        Self {
            document,
            resolver,
            store,
            classifier,
            annotator,
            session,
            running: AsyncMutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<VerdictStore> {
        &self.store
    }

    /// Whether any message candidate is still unannotated.
    pub fn has_unannotated_candidates(&self) -> bool {
        self.document
            .read(|doc| !self.annotator.unannotated_candidates(doc).is_empty())
    }

    /// Sweeps every candidate once. Concurrent callers are serialized.
    pub async fn scan(&self) -> ScanReport {
        let _running = self.running.lock().await;
        let mut report = ScanReport::default();

        let generation = self.session.generation();
        if !self.session.is_current(generation) {
            return report;
        }

        let profile = self.resolver.profile();
        let (conversation, candidates) = self.document.read(|doc| {
            (
                self.resolver.resolve_conversation_identity(doc),
                doc.query_selector_all(doc.body(), &profile.message_marker),
            )
        });
        report.candidates = candidates.len();

        for node in candidates {
            if !self.session.is_current(generation) {
                report.discarded = true;
                break;
            }

            match self.next_step(node, &conversation) {
                Step::Gone => {}
                Step::Annotated => report.already_annotated += 1,
                Step::Cached(verdict) => {
                    report.cache_hits += 1;
                    if verdict.is_flagged && self.annotate(node, &conversation, &verdict) {
                        report.reapplied += 1;
                    }
                }
                Step::Classify(key, text) => {
                    if !is_classifiable(&text) {
                        report.skipped_empty += 1;
                        continue;
                    }

                    let result = self.classifier.classify(&text).await;

                    // The session may have stopped while the call was in flight.
                    if !self.session.is_current(generation) {
                        report.discarded = true;
                        break;
                    }

                    match result {
                        Classification::Verdict(verdict) => {
                            report.classified += 1;
                            self.store.put(key, verdict.clone());
                            if verdict.is_flagged {
                                report.flagged += 1;
                                let preview: String = text.chars().take(50).collect();
                                info!(target: "scan", "Flagged message detected: \"{}\"", preview);
                                self.annotate(node, &conversation, &verdict);
                            }
                        }
                        Classification::Unavailable => {
                            report.unavailable += 1;
                        }
                    }
                }
            }
        }

        debug!(target: "scan", ?report, "scan finished");
        report
    }

    fn next_step(&self, node: NodeId, conversation: &ConversationIdentity) -> Step {
        self.document.read(|doc| {
            if !doc.is_connected(node) {
                return Step::Gone;
            }
            if self.annotator.is_annotated(doc, node) {
                return Step::Annotated;
            }
            let key = CompositeKey::new(
                conversation.clone(),
                self.resolver.resolve_message_identity(doc, node),
            );
            if let Some(verdict) = self.store.get(&key) {
                return Step::Cached(verdict);
            }
            Step::Classify(key, self.resolver.extract_message_text(doc, node))
        })
    }

    /// Applies the annotation unless the node left the document or the
    /// document moved on to another conversation.
    fn annotate(&self, node: NodeId, conversation: &ConversationIdentity, verdict: &Verdict) -> bool {
        self.document.mutate(|doc| {
            if !doc.is_connected(node)
                || &self.resolver.resolve_conversation_identity(doc) != conversation
            {
                return false;
            }
            match self.annotator.apply(doc, node, verdict) {
                Ok(applied) => applied,
                Err(e) => {
                    warn!(target: "scan", "Failed to annotate node {}: {}", node.as_u64(), e);
                    false
                }
            }
        })
    }
}
