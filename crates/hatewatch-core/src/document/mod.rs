//! In-memory model of the host chat document.
//!
//! The host owns the tree and mutates it freely; the engine reads it and
//! adds annotations. Every mutation is recorded and delivered in batches to
//! registered [`MutationObserver`]s, mirroring the notification API of a
//! browser document.

pub mod selector;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use slotmap::{Key, KeyData, SlotMap};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::error::{HatewatchError, Result};
pub use selector::Selector;

slotmap::new_key_type! {
    /// Identifier of an element in a [`Document`]. Once the element is
    /// removed its id never resolves again, even after the slot is reused.
    pub struct NodeId;
}

impl NodeId {
    /// Numeric form exchanged with hosts.
    pub fn as_u64(self) -> u64 {
        self.data().as_ffi()
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        KeyData::from_ffi(raw).into()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u64())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.as_u64())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        u64::deserialize(deserializer).map(NodeId::from)
    }
}

/// Description of an element subtree to insert into the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        let classes = self.attributes.entry("class".to_string()).or_default();
        if !classes.is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// One recorded change to the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    #[serde(default)]
    pub added_nodes: Vec<NodeId>,
    #[serde(default)]
    pub removed_nodes: Vec<NodeId>,
    #[serde(default)]
    pub attribute_name: Option<String>,
}

impl MutationRecord {
    fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added_nodes: added,
            removed_nodes: removed,
            attribute_name: None,
        }
    }
}

/// What an observer wants to hear about for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserveOptions {
    #[serde(default)]
    pub child_list: bool,
    #[serde(default)]
    pub attributes: bool,
    /// Restricts attribute notifications to these names when set
    #[serde(default)]
    pub attribute_filter: Option<Vec<String>>,
    #[serde(default)]
    pub subtree: bool,
    #[serde(default)]
    pub character_data: bool,
}

impl ObserveOptions {
    fn wants(&self, record: &MutationRecord) -> bool {
        match record.kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
            MutationKind::Attributes => {
                self.attributes
                    && match (&self.attribute_filter, &record.attribute_name) {
                        (Some(filter), Some(name)) => filter.iter().any(|f| f == name),
                        (Some(_), None) => false,
                        (None, _) => true,
                    }
            }
        }
    }
}

pub type MutationBatch = Vec<MutationRecord>;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Receives batches of mutation records for the targets it observes.
///
/// The batch sequence never ends on its own; dropping the observer
/// disconnects it from every target.
pub struct MutationObserver {
    id: u64,
    sender: mpsc::UnboundedSender<MutationBatch>,
    receiver: mpsc::UnboundedReceiver<MutationBatch>,
}

impl MutationObserver {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            id: NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed),
            sender,
            receiver,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next delivered batch.
    pub async fn next_batch(&mut self) -> Option<MutationBatch> {
        self.receiver.recv().await
    }

    /// Returns a batch if one is already queued.
    pub fn try_next_batch(&mut self) -> Option<MutationBatch> {
        self.receiver.try_recv().ok()
    }
}

impl Default for MutationObserver {
    fn default() -> Self {
        Self::new()
    }
}

struct Registration {
    observer: u64,
    target: NodeId,
    options: ObserveOptions,
    sender: mpsc::UnboundedSender<MutationBatch>,
}

/// The document tree.
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    body: NodeId,
    location: String,
    registrations: Vec<Registration>,
    pending: Vec<(MutationRecord, Vec<u64>)>,
}

impl Document {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let body = nodes.insert(Node {
            tag: "body".to_string(),
            attributes: BTreeMap::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
        });
        Self {
            nodes,
            body,
            location: String::new(),
            registrations: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Changes the navigation locator. Produces no mutation record.
    pub fn navigate(&mut self, location: &str) {
        self.location = location.to_string();
    }

    // ========================================================================
    // Reads
    // ========================================================================

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(HatewatchError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.tag.as_str())
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attribute(id, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Concatenated text of the element and all its descendants in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.node(id) {
            out.push_str(&node.text);
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// Whether the element is reachable from the body.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.body {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Whether `node` lies strictly inside `ancestor`.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// All descendants of `scope` in document (pre-)order, excluding `scope`.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        selector.matches(self, id)
    }

    /// First descendant of `scope` matching `selector`.
    pub fn query_selector(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|id| selector.matches(self, *id))
    }

    pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if selector.matches(self, node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Builds a detached subtree from `spec` and returns its root.
    pub fn create_element(&mut self, spec: &ElementSpec) -> NodeId {
        let id = self.nodes.insert(Node {
            tag: spec.tag.to_ascii_lowercase(),
            attributes: spec.attributes.clone(),
            text: spec.text.clone(),
            children: Vec::new(),
            parent: None,
        });
        for child_spec in &spec.children {
            let child = self.create_element(child_spec);
            self.nodes[child].parent = Some(id);
            self.nodes[id].children.push(child);
        }
        id
    }

    /// Appends `child` to `parent`, moving it if it is already attached.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.contains(parent) {
            return Err(HatewatchError::UnknownNode(parent));
        }
        if !self.contains(child) {
            return Err(HatewatchError::UnknownNode(child));
        }
        if child == parent || self.is_descendant_of(parent, child) {
            return Err(HatewatchError::InvalidTree(format!(
                "node {} cannot be appended inside itself",
                child
            )));
        }
        self.detach(child);
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.record(MutationRecord::child_list(parent, vec![child], Vec::new()));
        Ok(())
    }

    /// Creates the subtree described by `spec` and appends it to `parent`.
    pub fn insert(&mut self, parent: NodeId, spec: &ElementSpec) -> Result<NodeId> {
        if !self.contains(parent) {
            return Err(HatewatchError::UnknownNode(parent));
        }
        let id = self.create_element(spec);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Detaches `id` from its parent and frees its subtree. Removing the
    /// body is a no-op.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if !self.contains(id) {
            return Err(HatewatchError::UnknownNode(id));
        }
        if id == self.body {
            return Ok(());
        }
        self.detach(id);
        self.release(id);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = None;
        }
        self.record(MutationRecord::child_list(parent, Vec::new(), vec![id]));
    }

    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                stack.extend(node.children);
            }
        }
        let nodes = &self.nodes;
        self.registrations.retain(|r| nodes.contains_key(r.target));
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        self.node_mut(id)?
            .attributes
            .insert(name.to_string(), value.to_string());
        self.record_attribute(id, name);
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<()> {
        if self.node_mut(id)?.attributes.remove(name).is_some() {
            self.record_attribute(id, name);
        }
        Ok(())
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let mut classes = self.attribute(id, "class").unwrap_or("").to_string();
        if !classes.is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        self.set_attribute(id, "class", &classes)
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        if !self.has_class(id, class) {
            return Ok(());
        }
        let remaining: Vec<&str> = self
            .attribute(id, "class")
            .unwrap_or("")
            .split_whitespace()
            .filter(|c| *c != class)
            .collect();
        let joined = remaining.join(" ");
        self.set_attribute(id, "class", &joined)
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.node_mut(id)?.text = text.to_string();
        self.record(MutationRecord {
            kind: MutationKind::CharacterData,
            target: id,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: None,
        });
        Ok(())
    }

    fn record_attribute(&mut self, id: NodeId, name: &str) {
        self.record(MutationRecord {
            kind: MutationKind::Attributes,
            target: id,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: Some(name.to_string()),
        });
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Registers `observer` for mutations on `target` (and its subtree when asked).
    ///
    /// Observing the same target again replaces the earlier options.
    pub fn observe(
        &mut self,
        observer: &MutationObserver,
        target: NodeId,
        options: ObserveOptions,
    ) -> Result<()> {
        if !self.contains(target) {
            return Err(HatewatchError::UnknownNode(target));
        }
        self.registrations
            .retain(|r| !(r.observer == observer.id && r.target == target));
        self.registrations.push(Registration {
            observer: observer.id,
            target,
            options,
            sender: observer.sender.clone(),
        });
        Ok(())
    }

    /// Removes every registration of the observer with `observer_id`.
    pub fn disconnect(&mut self, observer_id: u64) {
        self.registrations.retain(|r| r.observer != observer_id);
    }

    pub fn observer_count(&self) -> usize {
        let mut ids: Vec<u64> = self
            .registrations
            .iter()
            .filter(|r| !r.sender.is_closed())
            .map(|r| r.observer)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    fn record(&mut self, record: MutationRecord) {
        let mut interested: Vec<u64> = Vec::new();
        for reg in &self.registrations {
            let in_scope = reg.target == record.target
                || (reg.options.subtree && self.is_descendant_of(record.target, reg.target));
            if in_scope && reg.options.wants(&record) && !interested.contains(&reg.observer) {
                interested.push(reg.observer);
            }
        }
        if !interested.is_empty() {
            self.pending.push((record, interested));
        }
    }

    /// Delivers queued records, one batch per interested observer.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        let mut closed: Vec<u64> = Vec::new();

        let mut observers: Vec<u64> = self.registrations.iter().map(|r| r.observer).collect();
        observers.sort_unstable();
        observers.dedup();

        for observer in observers {
            let batch: MutationBatch = pending
                .iter()
                .filter(|(_, ids)| ids.contains(&observer))
                .map(|(record, _)| record.clone())
                .collect();
            if batch.is_empty() {
                continue;
            }
            let Some(reg) = self.registrations.iter().find(|r| r.observer == observer) else {
                continue;
            };
            if reg.sender.send(batch).is_err() {
                closed.push(observer);
            }
        }

        if !closed.is_empty() {
            self.registrations.retain(|r| !closed.contains(&r.observer));
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable shared access to a [`Document`].
///
/// The lock is never held across an await point.
#[derive(Clone)]
pub struct DocumentHandle {
    inner: Arc<Mutex<Document>>,
}

impl DocumentHandle {
    pub fn new(document: Document) -> Self {
        Self {
            inner: Arc::new(Mutex::new(document)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs a read-only closure against the document.
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        let doc = self.lock();
        f(&doc)
    }

    /// Runs a mutating closure and delivers the resulting records as one batch.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut doc = self.lock();
        let result = f(&mut doc);
        doc.flush();
        result
    }
}

impl Default for DocumentHandle {
    fn default() -> Self {
        Self::new(Document::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, text: &str) -> ElementSpec {
        ElementSpec::new("div")
            .attr("data-id", id)
            .child(ElementSpec::new("span").class("selectable-text").text(text))
    }

    #[test]
    fn test_text_content_in_document_order() {
        let mut doc = Document::new();
        let body = doc.body();
        let node = doc
            .insert(
                body,
                &ElementSpec::new("div")
                    .text("a")
                    .child(ElementSpec::new("span").text("b"))
                    .child(ElementSpec::new("span").text("c").child(ElementSpec::new("i").text("d"))),
            )
            .unwrap();
        assert_eq!(doc.text_content(node), "abcd");
    }

    #[test]
    fn test_query_selector_all_in_order() {
        let mut doc = Document::new();
        let body = doc.body();
        let first = doc.insert(body, &message("m1", "hello")).unwrap();
        let second = doc.insert(body, &message("m2", "world")).unwrap();
        let sel = Selector::parse("[data-id]").unwrap();
        assert_eq!(doc.query_selector_all(body, &sel), vec![first, second]);
        assert_eq!(doc.query_selector(body, &sel), Some(first));
    }

    #[test]
    fn test_removed_nodes_are_disconnected() {
        let mut doc = Document::new();
        let body = doc.body();
        let node = doc.insert(body, &message("m1", "hello")).unwrap();
        let span = doc.children(node)[0];
        doc.remove(node).unwrap();
        assert!(!doc.is_connected(node));
        assert!(!doc.is_connected(span));
        let sel = Selector::parse("[data-id]").unwrap();
        assert!(doc.query_selector_all(body, &sel).is_empty());
        // the whole subtree is freed
        assert!(!doc.contains(node));
        assert!(!doc.contains(span));
        assert_eq!(doc.text_content(node), "");
    }

    #[test]
    fn test_unknown_node_errors() {
        let mut doc = Document::new();
        let body = doc.body();
        let node = doc.insert(body, &message("m1", "hello")).unwrap();
        doc.remove(node).unwrap();
        assert!(matches!(
            doc.set_attribute(node, "x", "y"),
            Err(HatewatchError::UnknownNode(stale)) if stale == node
        ));
        assert!(matches!(
            doc.set_attribute(NodeId::from(42), "x", "y"),
            Err(HatewatchError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_removed_slots_are_reused_without_reviving_ids() {
        let mut doc = Document::new();
        let body = doc.body();
        let first = doc.insert(body, &message("m0", "hello")).unwrap();
        doc.remove(first).unwrap();
        for i in 1..10_000 {
            let node = doc.insert(body, &message(&format!("m{}", i), "hello")).unwrap();
            doc.remove(node).unwrap();
        }
        assert_eq!(doc.nodes.len(), 1);
        assert!(doc.nodes.capacity() <= 8);

        // the first id stays dead even though its slot was reused
        let latest = doc.insert(body, &message("last", "hello")).unwrap();
        assert_ne!(latest, first);
        assert!(!doc.contains(first));
        assert!(!doc.is_connected(first));
    }

    #[test]
    fn test_append_inside_itself_is_rejected() {
        let mut doc = Document::new();
        let body = doc.body();
        let outer = doc.insert(body, &message("m1", "hello")).unwrap();
        let inner = doc.children(outer)[0];
        assert!(matches!(
            doc.append_child(inner, outer),
            Err(HatewatchError::InvalidTree(_))
        ));
        assert!(matches!(
            doc.append_child(outer, outer),
            Err(HatewatchError::InvalidTree(_))
        ));
        assert_eq!(doc.parent(outer), Some(body));
    }

    #[test]
    fn test_append_child_moves_attached_node() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = doc.insert(body, &ElementSpec::new("div")).unwrap();
        let b = doc.insert(body, &message("m1", "hello")).unwrap();
        doc.append_child(a, b).unwrap();
        assert_eq!(doc.parent(b), Some(a));
        assert_eq!(doc.children(body), &[a]);
        assert_eq!(doc.text_content(a), "hello");
    }

    #[test]
    fn test_node_id_wire_form() {
        let mut doc = Document::new();
        let body = doc.body();
        let node = doc.insert(body, &message("m1", "hello")).unwrap();
        let raw = serde_json::to_value(node).unwrap();
        assert_eq!(raw, serde_json::json!(node.as_u64()));
        let back: NodeId = serde_json::from_value(raw).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_class_helpers() {
        let mut doc = Document::new();
        let body = doc.body();
        let node = doc.insert(body, &ElementSpec::new("div").class("a")).unwrap();
        doc.add_class(node, "b").unwrap();
        doc.add_class(node, "b").unwrap();
        assert_eq!(doc.attribute(node, "class"), Some("a b"));
        doc.remove_class(node, "a").unwrap();
        assert_eq!(doc.attribute(node, "class"), Some("b"));
    }

    #[tokio::test]
    async fn test_observer_receives_subtree_batch() {
        let handle = DocumentHandle::default();
        let mut observer = MutationObserver::new();
        let body = handle.read(|d| d.body());
        handle
            .mutate(|d| {
                d.observe(
                    &observer,
                    body,
                    ObserveOptions {
                        child_list: true,
                        subtree: true,
                        ..ObserveOptions::default()
                    },
                )
            })
            .unwrap();

        let (a, b) = handle.mutate(|d| {
            let a = d.insert(body, &message("m1", "one")).unwrap();
            let b = d.insert(a, &ElementSpec::new("span")).unwrap();
            (a, b)
        });

        let batch = observer.next_batch().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].added_nodes, vec![a]);
        assert_eq!(batch[1].target, a);
        assert_eq!(batch[1].added_nodes, vec![b]);
        assert!(observer.try_next_batch().is_none());
    }

    #[tokio::test]
    async fn test_attribute_filter_and_non_subtree() {
        let handle = DocumentHandle::default();
        let mut observer = MutationObserver::new();
        let (body, node) = handle.mutate(|d| {
            let body = d.body();
            let node = d.insert(body, &ElementSpec::new("div")).unwrap();
            (body, node)
        });
        handle
            .mutate(|d| {
                d.observe(
                    &observer,
                    body,
                    ObserveOptions {
                        attributes: true,
                        attribute_filter: Some(vec!["data-tab".to_string()]),
                        subtree: true,
                        ..ObserveOptions::default()
                    },
                )
            })
            .unwrap();

        handle.mutate(|d| d.set_attribute(node, "style", "x")).unwrap();
        assert!(observer.try_next_batch().is_none());

        handle.mutate(|d| d.set_attribute(node, "data-tab", "6")).unwrap();
        let batch = observer.try_next_batch().unwrap();
        assert_eq!(batch[0].attribute_name.as_deref(), Some("data-tab"));

        // child list changes are not requested
        handle.mutate(|d| d.insert(node, &ElementSpec::new("p"))).unwrap();
        assert!(observer.try_next_batch().is_none());
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let mut doc = Document::new();
        let body = doc.body();
        let observer = MutationObserver::new();
        doc.observe(
            &observer,
            body,
            ObserveOptions {
                child_list: true,
                ..ObserveOptions::default()
            },
        )
        .unwrap();
        assert_eq!(doc.observer_count(), 1);
        drop(observer);
        doc.insert(body, &ElementSpec::new("div")).unwrap();
        doc.flush();
        assert_eq!(doc.observer_count(), 0);
        assert!(doc.registrations.is_empty());
    }
}
