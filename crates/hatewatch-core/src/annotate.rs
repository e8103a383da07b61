//! Visual side effects on flagged messages.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::document::{Document, ElementSpec, NodeId, Selector};
use crate::error::Result;
use crate::profile::HostProfile;
use crate::state::Verdict;
use crate::store::VerdictStore;

/// An annotated message as currently shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub node: NodeId,
    pub suggestion: Option<String>,
}

/// Decorates flagged message nodes and removes those decorations again.
///
/// A node carrying the marker attribute is never decorated twice.
#[derive(Debug, Clone)]
pub struct AnnotationManager {
    profile: Arc<HostProfile>,
    default_suggestion: String,
}

impl AnnotationManager {
    pub fn new(profile: Arc<HostProfile>, default_suggestion: &str) -> Self {
        Self {
            profile,
            default_suggestion: default_suggestion.to_string(),
        }
    }

    fn marker(&self) -> Selector {
        self.profile.annotation_marker()
    }

    pub fn is_annotated(&self, doc: &Document, node: NodeId) -> bool {
        doc.has_attribute(node, &self.profile.annotation.marker_attribute)
    }

    /// Annotated message nodes currently attached to the document.
    pub fn annotated_nodes(&self, doc: &Document) -> Vec<NodeId> {
        doc.query_selector_all(doc.body(), &self.marker())
    }

    pub fn annotations(&self, doc: &Document) -> Vec<Annotation> {
        let note = Selector::class(&self.profile.annotation.suggestion_class);
        self.annotated_nodes(doc)
            .into_iter()
            .map(|node| Annotation {
                node,
                suggestion: doc.query_selector(node, &note).map(|n| doc.text_content(n)),
            })
            .collect()
    }

    /// Message candidates that carry no annotation yet.
    pub fn unannotated_candidates(&self, doc: &Document) -> Vec<NodeId> {
        doc.query_selector_all(doc.body(), &self.profile.message_marker)
            .into_iter()
            .filter(|n| !self.is_annotated(doc, *n))
            .collect()
    }

    /// Where the suggestion note is attached inside a message.
    pub fn content_region(&self, doc: &Document, message: NodeId) -> Option<NodeId> {
        HostProfile::first_match(doc, message, &self.profile.content_anchors)
            .and_then(|anchor| doc.parent(anchor))
            .or_else(|| HostProfile::first_match(doc, message, &self.profile.content_fallbacks))
    }

    /// Decorates the message containing `node`. Returns whether anything was applied.
    pub fn apply(&self, doc: &mut Document, node: NodeId, verdict: &Verdict) -> Result<bool> {
        let vocab = &self.profile.annotation;
        let Some(message) = doc.closest(node, &self.profile.message_marker) else {
            return Ok(false);
        };
        if self.is_annotated(doc, message) {
            return Ok(false);
        }

        doc.set_attribute(message, &vocab.marker_attribute, "true")?;
        doc.add_class(message, &vocab.flag_class)?;

        let indicator = Selector::class(&vocab.indicator_class);
        if doc.query_selector(message, &indicator).is_none() {
            doc.insert(
                message,
                &ElementSpec::new("div")
                    .class(&vocab.indicator_class)
                    .text(&vocab.indicator_text),
            )?;
        }

        let note = Selector::class(&vocab.suggestion_class);
        if doc.query_selector(message, &note).is_none() {
            if let Some(region) = self.content_region(doc, message) {
                let suggestion = verdict
                    .suggestion
                    .as_deref()
                    .unwrap_or(&self.default_suggestion);
                doc.insert(
                    region,
                    &ElementSpec::new("div")
                        .class(&vocab.suggestion_class)
                        .text(&format!("{}{}", vocab.suggestion_prefix, suggestion)),
                )?;
            }
        }

        debug!(target: "annotate", node = message.as_u64(), "annotated message");
        Ok(true)
    }

    /// Removes every indicator and suggestion and strips styling and markers
    /// from every annotated node. Returns the number of nodes unmarked.
    pub fn full_clean(&self, doc: &mut Document) -> Result<usize> {
        let vocab = &self.profile.annotation;
        let body = doc.body();

        for class in [&vocab.indicator_class, &vocab.suggestion_class] {
            for artifact in doc.query_selector_all(body, &Selector::class(class)) {
                doc.remove(artifact)?;
            }
        }

        let marked = doc.query_selector_all(body, &self.marker());
        for node in &marked {
            doc.remove_class(*node, &vocab.flag_class)?;
            doc.remove_attribute(*node, &vocab.marker_attribute)?;
        }

        if !marked.is_empty() {
            debug!(target: "annotate", count = marked.len(), "cleaned annotations");
        }
        Ok(marked.len())
    }

    /// Explicit user reset: clean the document and forget every verdict.
    pub fn reset_all(&self, doc: &mut Document, store: &VerdictStore) -> Result<usize> {
        let cleaned = self.full_clean(doc)?;
        store.clear();
        Ok(cleaned)
    }
}
