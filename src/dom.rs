//! Headless document model
//!
//! The portal only touches a small part of a page: the attributes of the
//! document root (`data-service`, `data-theme`, `class`), the `<style>`
//! nodes in `<head>`, and the container elements remotes render into. This
//! module models exactly that, plus mutation observers over the root
//! attributes and the head children.
//!
//! Observer callbacks run synchronously after the mutation is applied, with
//! no document lock held, so a callback may read or write the document.

use parking_lot::Mutex;
use portal_bridge_core::ContainerId;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Handle of a node in `<head>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// A `<style>` element in `<head>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleNode {
    /// Node handle
    pub id: NodeId,
    /// Element attributes
    pub attributes: BTreeMap<String, String>,
    /// Stylesheet text
    pub css: String,
}

/// One observed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// A root attribute was set or removed
    Attribute {
        /// Attribute name
        name: String,
        /// Value before the change
        old_value: Option<String>,
    },
    /// A node was appended to `<head>`
    ChildAdded(NodeId),
}

/// What an observer watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveTarget {
    /// Root attributes; an empty filter means all of them
    RootAttributes(Vec<String>),
    /// Children appended to `<head>`
    HeadChildren,
}

impl ObserveTarget {
    fn matches(&self, record: &MutationRecord) -> bool {
        match (self, record) {
            (ObserveTarget::RootAttributes(filter), MutationRecord::Attribute { name, .. }) => {
                filter.is_empty() || filter.iter().any(|f| f == name)
            }
            (ObserveTarget::HeadChildren, MutationRecord::ChildAdded(_)) => true,
            _ => false,
        }
    }
}

/// Observer callback
pub type MutationCallback = Arc<dyn Fn(&[MutationRecord], &Document) + Send + Sync>;

struct ObserverEntry {
    id: u64,
    target: ObserveTarget,
    paused: Arc<AtomicBool>,
    callback: MutationCallback,
}

#[derive(Default)]
struct DocInner {
    root_attributes: Mutex<BTreeMap<String, String>>,
    head: Mutex<Vec<StyleNode>>,
    observers: Mutex<Vec<ObserverEntry>>,
    next_id: AtomicU64,
}

/// The page the host shell runs in
#[derive(Clone, Default)]
pub struct Document {
    inner: Arc<DocInner>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root_attributes", &*self.inner.root_attributes.lock())
            .field("styles", &self.inner.head.lock().len())
            .field("observers", &self.live_observer_count())
            .finish()
    }
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Read a root attribute
    pub fn root_attribute(&self, name: &str) -> Option<String> {
        self.inner.root_attributes.lock().get(name).cloned()
    }

    /// Set a root attribute. Writing the current value is not a mutation.
    pub fn set_root_attribute(&self, name: &str, value: &str) {
        let old_value = {
            let mut attrs = self.inner.root_attributes.lock();
            if attrs.get(name).map(String::as_str) == Some(value) {
                return;
            }
            attrs.insert(name.to_string(), value.to_string())
        };
        self.notify(MutationRecord::Attribute {
            name: name.to_string(),
            old_value,
        });
    }

    /// Remove a root attribute
    pub fn remove_root_attribute(&self, name: &str) {
        let old_value = self.inner.root_attributes.lock().remove(name);
        if old_value.is_some() {
            self.notify(MutationRecord::Attribute {
                name: name.to_string(),
                old_value,
            });
        }
    }

    /// Whether the root `class` list contains `class`
    pub fn has_class(&self, class: &str) -> bool {
        self.root_attribute("class")
            .is_some_and(|list| list.split_whitespace().any(|c| c == class))
    }

    /// Add or remove `class` on the root `class` list
    pub fn toggle_class(&self, class: &str, on: bool) {
        let current = self.root_attribute("class").unwrap_or_default();
        let mut classes: Vec<&str> = current.split_whitespace().filter(|c| *c != class).collect();
        if on {
            classes.push(class);
        }
        let next = classes.join(" ");
        if next.is_empty() {
            self.remove_root_attribute("class");
        } else {
            self.set_root_attribute("class", &next);
        }
    }

    /// Append a `<style>` node to `<head>`
    pub fn append_style(&self, css: &str) -> NodeId {
        let id = NodeId(self.next_id());
        self.inner.head.lock().push(StyleNode {
            id,
            attributes: BTreeMap::new(),
            css: css.to_string(),
        });
        self.notify(MutationRecord::ChildAdded(id));
        id
    }

    /// Remove a `<style>` node
    pub fn remove_style(&self, id: NodeId) -> bool {
        let mut head = self.inner.head.lock();
        let before = head.len();
        head.retain(|n| n.id != id);
        head.len() != before
    }

    /// Snapshot of `<head>` styles
    pub fn styles(&self) -> Vec<StyleNode> {
        self.inner.head.lock().clone()
    }

    /// Read an attribute of a `<style>` node
    pub fn style_attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.inner
            .head
            .lock()
            .iter()
            .find(|n| n.id == id)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    /// Set an attribute of a `<style>` node. Not observed.
    pub fn set_style_attribute(&self, id: NodeId, name: &str, value: &str) -> bool {
        match self.inner.head.lock().iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.attributes.insert(name.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    /// Start observing `target`
    pub fn observe<F>(&self, target: ObserveTarget, callback: F) -> MutationObserver
    where
        F: Fn(&[MutationRecord], &Document) + Send + Sync + 'static,
    {
        let id = self.next_id();
        let paused = Arc::new(AtomicBool::new(false));
        self.inner.observers.lock().push(ObserverEntry {
            id,
            target,
            paused: paused.clone(),
            callback: Arc::new(callback),
        });
        trace!(observer = id, "observer connected");
        MutationObserver {
            id,
            doc: Arc::downgrade(&self.inner),
            paused,
            connected: AtomicBool::new(true),
        }
    }

    /// Number of connected observers, paused ones included
    pub fn live_observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Create a container element attached to the document
    pub fn create_container(&self) -> Container {
        Container {
            inner: Arc::new(ContainerInner {
                id: ContainerId::random(),
                content: Mutex::new(String::new()),
                attached: AtomicBool::new(true),
            }),
        }
    }

    fn notify(&self, record: MutationRecord) {
        let targets: Vec<MutationCallback> = self
            .inner
            .observers
            .lock()
            .iter()
            .filter(|o| !o.paused.load(Ordering::Acquire) && o.target.matches(&record))
            .map(|o| o.callback.clone())
            .collect();

        let records = [record];
        for callback in targets {
            callback(&records, self);
        }
    }
}

/// Registration of a mutation callback.
///
/// Mutations that happen while paused are never delivered. Disconnects on
/// drop.
pub struct MutationObserver {
    id: u64,
    doc: Weak<DocInner>,
    paused: Arc<AtomicBool>,
    connected: AtomicBool,
}

impl MutationObserver {
    /// Stop delivering mutations until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Deliver mutations again
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Whether delivery is paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Whether still registered on the document
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Remove the observer from the document. Idempotent.
    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(doc) = self.doc.upgrade() {
            doc.observers.lock().retain(|o| o.id != self.id);
        }
        trace!(observer = self.id, "observer disconnected");
    }
}

impl Drop for MutationObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationObserver")
            .field("id", &self.id)
            .field("paused", &self.is_paused())
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct ContainerInner {
    id: ContainerId,
    content: Mutex<String>,
    attached: AtomicBool,
}

/// Element a remote renders into. Clones are the same element.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Identity of the element
    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    /// Rendered markup
    pub fn content(&self) -> String {
        self.inner.content.lock().clone()
    }

    /// Replace the rendered markup
    pub fn set_content(&self, html: impl Into<String>) {
        *self.inner.content.lock() = html.into();
    }

    /// Empty the element
    pub fn clear(&self) {
        self.inner.content.lock().clear();
    }

    /// Whether the element has no content
    pub fn is_empty(&self) -> bool {
        self.inner.content.lock().is_empty()
    }

    /// Whether the element is still in the document
    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }

    /// Take the element out of the document
    pub fn detach(&self) {
        self.inner.attached.store(false, Ordering::Release);
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Container {}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}
