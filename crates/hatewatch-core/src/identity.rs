//! Stable identities for messages and conversations.
//!
//! Host re-renders destroy and recreate message nodes freely, so nothing
//! here may depend on node ids: identities come from attributes and text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::document::{Document, NodeId};
use crate::profile::HostProfile;

/// Characters of message text that feed the fallback fingerprint.
pub const FINGERPRINT_PREFIX_CHARS: usize = 50;

/// Identity used when neither a header title nor a locator fragment is available.
pub const DEFAULT_CONVERSATION: &str = "default_conversation";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageIdentity(String);

impl MessageIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationIdentity(String);

impl ConversationIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn fallback() -> Self {
        Self(DEFAULT_CONVERSATION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base64 of `raw` with everything but ASCII alphanumerics removed.
fn encode_alphanumeric(raw: &str) -> String {
    STANDARD
        .encode(raw.as_bytes())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Hex digits of the SHA-256 digest kept in a fingerprint.
const FINGERPRINT_LEN: usize = 32;

/// Truncated SHA-256 of the text prefix and timestamp. The separator keeps
/// ("ab", "c") and ("a", "bc") apart.
fn fingerprint(prefix: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update([0x1f]);
    hasher.update(timestamp.as_bytes());
    let hash = hex::encode(hasher.finalize());
    hash[..FINGERPRINT_LEN].to_string()
}

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    profile: Arc<HostProfile>,
}

impl IdentityResolver {
    pub fn new(profile: Arc<HostProfile>) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &HostProfile {
        &self.profile
    }

    /// Identity of a message node: the host's stable id when present,
    /// otherwise a fingerprint of its leading text and rendering timestamp.
    pub fn resolve_message_identity(&self, doc: &Document, node: NodeId) -> MessageIdentity {
        if let Some(id) = doc.attribute(node, &self.profile.stable_id_attribute) {
            if !id.is_empty() {
                return MessageIdentity::new(id);
            }
        }

        let text = HostProfile::first_match(doc, node, &self.profile.text_selectors)
            .map(|el| doc.text_content(el))
            .unwrap_or_default();
        let prefix: String = text.chars().take(FINGERPRINT_PREFIX_CHARS).collect();

        let timestamp_attr = &self.profile.timestamp_attribute;
        let timestamp = doc
            .attribute(node, timestamp_attr)
            .or_else(|| {
                doc.descendants(node)
                    .into_iter()
                    .find_map(|d| doc.attribute(d, timestamp_attr))
            })
            .unwrap_or("");

        MessageIdentity::new(format!("msg_{}", fingerprint(&prefix, timestamp)))
    }

    /// Identity of the conversation currently on screen.
    pub fn resolve_conversation_identity(&self, doc: &Document) -> ConversationIdentity {
        if let Some(title) = self.header_title(doc) {
            let encoded = encode_alphanumeric(&title);
            if !encoded.is_empty() {
                return ConversationIdentity::new(encoded);
            }
        }

        let location = doc.location();
        if let Some(pos) = location.find('#') {
            let fragment = &location[pos..];
            if fragment.len() > 1 {
                return ConversationIdentity::new(encode_alphanumeric(fragment));
            }
        }

        ConversationIdentity::fallback()
    }

    fn header_title(&self, doc: &Document) -> Option<String> {
        let header = HostProfile::first_match(doc, doc.body(), &self.profile.header_selectors)?;
        let title_el = self
            .profile
            .header_title_selectors
            .iter()
            .find_map(|s| {
                if doc.matches(header, s) {
                    Some(header)
                } else {
                    doc.query_selector(header, s)
                }
            })?;

        let text = doc.text_content(title_el);
        if !text.trim().is_empty() {
            return Some(text);
        }
        doc.attribute(title_el, "title")
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
    }

    /// Whether the message quotes an earlier one.
    pub fn is_reply(&self, doc: &Document, node: NodeId) -> bool {
        HostProfile::first_match(doc, node, &self.profile.reply_quote_markers).is_some()
    }

    /// Text the author wrote in this message.
    ///
    /// For replies only the response region is read, never the quoted
    /// message. Returns an empty string when no text-bearing element exists.
    pub fn extract_message_text(&self, doc: &Document, node: NodeId) -> String {
        let strategies = if self.is_reply(doc, node) {
            &self.profile.reply_response_selectors
        } else {
            &self.profile.text_selectors
        };
        HostProfile::first_match(doc, node, strategies)
            .map(|el| doc.text_content(el))
            .unwrap_or_default()
    }
}
