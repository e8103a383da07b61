//! Locator strategies describing the shape of one host chat document.
//!
//! Every list is tried in order and the first match wins, so a profile can
//! carry fallbacks for several revisions of the host markup.

use serde::{Deserialize, Serialize};

use crate::document::{Document, NodeId, Selector};

/// Vocabulary the annotation layer writes into the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationVocabulary {
    /// Attribute marking a node as already annotated
    pub marker_attribute: String,
    /// Class carrying the flagged-message styling
    pub flag_class: String,
    pub indicator_class: String,
    pub suggestion_class: String,
    pub indicator_text: String,
    pub suggestion_prefix: String,
}

impl Default for AnnotationVocabulary {
    fn default() -> Self {
        Self {
            marker_attribute: "data-hate-annotated".to_string(),
            flag_class: "hate-flagged".to_string(),
            indicator_class: "hate-indicator".to_string(),
            suggestion_class: "hate-correction".to_string(),
            indicator_text: "⚠".to_string(),
            suggestion_prefix: "Suggestion: ".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProfile {
    /// Marks a rendered message container
    pub message_marker: Selector,
    /// Attribute carrying a host-assigned stable message id
    pub stable_id_attribute: String,
    /// Text-bearing sub-elements of a plain message
    pub text_selectors: Vec<Selector>,
    /// Attribute holding the host's rendering timestamp
    pub timestamp_attribute: String,
    /// Presence of any of these inside a message makes it a reply
    pub reply_quote_markers: Vec<Selector>,
    /// Where the newly authored text of a reply lives
    pub reply_response_selectors: Vec<Selector>,
    pub header_selectors: Vec<Selector>,
    pub header_title_selectors: Vec<Selector>,
    /// Added nodes containing one of these announce a conversation switch
    pub header_change_markers: Vec<Selector>,
    pub active_tab_attribute: String,
    pub active_class: String,
    /// Attribute names reported to the change observer
    pub observed_attributes: Vec<String>,
    pub observer_roots: Vec<Selector>,
    pub sidebar_roots: Vec<Selector>,
    pub ready_markers: Vec<Selector>,
    /// The parent of the first match is the content region of a message
    pub content_anchors: Vec<Selector>,
    /// Used directly when no anchor matches
    pub content_fallbacks: Vec<Selector>,
    pub annotation: AnnotationVocabulary,
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            message_marker: Selector::attribute("data-id"),
            stable_id_attribute: "data-id".to_string(),
            text_selectors: Selector::parse_list(&[
                ".copyable-text",
                "[data-pre-plain-text]",
                ".selectable-text",
            ]),
            timestamp_attribute: "data-pre-plain-text".to_string(),
            reply_quote_markers: Selector::parse_list(&["._aju2"]),
            reply_response_selectors: Selector::parse_list(&[
                "._akbu .selectable-text",
                "._akbu .copyable-text",
            ]),
            header_selectors: Selector::parse_list(&[
                r#"[data-tab="6"] header"#,
                r#"header[data-testid="conversation-header"]"#,
                r#"[data-tab="6"] [title]"#,
            ]),
            header_title_selectors: Selector::parse_list(&["[title]", r#"span[dir="auto"]"#]),
            header_change_markers: Selector::parse_list(&[
                r#"header[data-testid="conversation-header"]"#,
                r#"[data-tab="6"] header"#,
            ]),
            active_tab_attribute: "data-tab".to_string(),
            active_class: "active".to_string(),
            observed_attributes: vec![
                "data-tab".to_string(),
                "class".to_string(),
                "data-id".to_string(),
            ],
            observer_roots: Selector::parse_list(&[
                r#"[data-tab="1"]"#,
                "#main",
                r#"div[role="main"]"#,
            ]),
            sidebar_roots: Selector::parse_list(&[
                r#"[data-tab="3"]"#,
                r#"div[data-testid="chat-list"]"#,
            ]),
            ready_markers: Selector::parse_list(&[
                r#"[data-tab="1"]"#,
                "#main",
                r#"[role="textbox"]"#,
            ]),
            content_anchors: Selector::parse_list(&[".copyable-text", ".selectable-text"]),
            content_fallbacks: Selector::parse_list(&["[data-id] > div"]),
            annotation: AnnotationVocabulary::default(),
        }
    }
}

impl HostProfile {
    /// First match of the first strategy that matches anything inside `scope`.
    pub fn first_match(doc: &Document, scope: NodeId, strategies: &[Selector]) -> Option<NodeId> {
        strategies
            .iter()
            .find_map(|selector| doc.query_selector(scope, selector))
    }

    /// Whether `node` matches or contains any of `strategies`.
    pub fn matches_or_contains(doc: &Document, node: NodeId, strategies: &[Selector]) -> bool {
        strategies
            .iter()
            .any(|s| doc.matches(node, s) || doc.query_selector(node, s).is_some())
    }

    /// The container the change observer attaches to, falling back to the body.
    pub fn observer_root(&self, doc: &Document) -> NodeId {
        Self::first_match(doc, doc.body(), &self.observer_roots).unwrap_or_else(|| doc.body())
    }

    pub fn sidebar_root(&self, doc: &Document) -> Option<NodeId> {
        Self::first_match(doc, doc.body(), &self.sidebar_roots)
    }

    pub fn is_ready(&self, doc: &Document) -> bool {
        Self::first_match(doc, doc.body(), &self.ready_markers).is_some()
    }

    pub fn annotation_marker(&self) -> Selector {
        Selector::attribute(&self.annotation.marker_attribute)
    }

    /// Whether an attribute mutation on `node` signals a tab switch.
    pub fn is_active_marker(&self, doc: &Document, node: NodeId) -> bool {
        doc.has_attribute(node, &self.active_tab_attribute) || doc.has_class(node, &self.active_class)
    }
}
