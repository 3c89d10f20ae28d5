//! Host-side bookkeeping of mounted remote instances
//!
//! One record per container. The record owns the instance handle, the
//! navigation callback the host handed out, the style observer tagging the
//! remote's `<style>` nodes, the activity flag and the theme the instance
//! should be showing.
//!
//! Keep-alive: a deactivated record keeps its instance and pauses its
//! observer. Theme changes that arrive while it is inactive only overwrite
//! `current_theme`; reactivation flushes the last one exactly once.
//!
//! Instance callbacks are always invoked after the map entry is released,
//! so an instance may call back into the registry.

use crate::dom::{Container, Document, MutationObserver, MutationRecord, ObserveTarget};
use crate::mount::RemoteInstance;
use crate::navigation::NavigateCallback;
use crate::sync::{InstanceGuard, Liveness};
use dashmap::DashMap;
use portal_bridge_core::constants::DATA_MF_APP_ATTR;
use portal_bridge_core::{remote_debug, remote_info, ContainerId, Theme};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Tags `<style>` nodes added to `<head>` with the owning service
pub struct StyleObserver {
    service: String,
    observer: MutationObserver,
}

impl StyleObserver {
    /// Start tagging unmarked styles with `service`
    pub fn observe(document: &Document, service: &str) -> Self {
        let tag = service.to_string();
        let observer = document.observe(ObserveTarget::HeadChildren, move |records, doc| {
            for record in records {
                if let MutationRecord::ChildAdded(node) = record {
                    if doc.style_attribute(*node, DATA_MF_APP_ATTR).is_none() {
                        doc.set_style_attribute(*node, DATA_MF_APP_ATTR, &tag);
                    }
                }
            }
        });
        Self {
            service: service.to_string(),
            observer,
        }
    }

    /// Service the observer tags with
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Stop tagging while the remote is hidden
    pub fn pause(&self) {
        self.observer.pause();
    }

    /// Tag again
    pub fn resume(&self) {
        self.observer.resume();
    }

    /// Whether tagging is paused
    pub fn is_paused(&self) -> bool {
        self.observer.is_paused()
    }

    /// Detach from the document
    pub fn disconnect(&self) {
        self.observer.disconnect();
    }

    /// Whether still attached to the document
    pub fn is_connected(&self) -> bool {
        self.observer.is_connected()
    }
}

impl fmt::Debug for StyleObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleObserver")
            .field("service", &self.service)
            .field("observer", &self.observer)
            .finish()
    }
}

/// What the host hands the registry for a fresh mount
pub struct NewInstance {
    /// Remote name
    pub remote: String,
    /// `data-service` value of the remote
    pub service: String,
    /// Container the instance lives in
    pub container: Container,
    /// Handle returned by `mount`
    pub instance: Arc<dyn RemoteInstance>,
    /// Host handler for remote-initiated navigation
    pub navigate_callback: Option<NavigateCallback>,
    /// Theme the instance was mounted with
    pub theme: Option<Theme>,
}

struct InstanceRecord {
    remote: String,
    container: Container,
    instance: Arc<dyn RemoteInstance>,
    navigate_callback: Option<NavigateCallback>,
    style_observer: Option<StyleObserver>,
    is_active: bool,
    current_theme: Option<Theme>,
    theme_pending: bool,
    liveness: Liveness,
}

impl InstanceRecord {
    // Synchronous: nothing owned by the record survives this call.
    fn teardown(mut self) {
        self.liveness.invalidate();
        self.navigate_callback = None;
        if let Some(observer) = self.style_observer.take() {
            observer.disconnect();
        }
        self.instance.unmount();
        self.container.clear();
        remote_info!(self.remote, "instance in {} released", self.container.id());
    }
}

/// Public view of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Container id
    pub container: ContainerId,
    /// Remote name
    pub remote: String,
    /// Whether the instance is visible
    pub is_active: bool,
    /// Theme the instance shows or will show on reactivation
    pub current_theme: Option<Theme>,
    /// Whether a theme change waits for reactivation
    pub theme_pending: bool,
}

/// Records of every mounted instance, keyed by container
pub struct InstanceRegistry {
    document: Document,
    records: DashMap<ContainerId, InstanceRecord>,
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("records", &self.records.len())
            .finish()
    }
}

impl InstanceRegistry {
    /// Empty registry over `document`
    pub fn new(document: Document) -> Self {
        Self {
            document,
            records: DashMap::new(),
        }
    }

    /// Register a mounted instance, replacing any record for the same container
    pub fn insert(&self, entry: NewInstance) -> ContainerId {
        let id = entry.container.id();
        let record = InstanceRecord {
            style_observer: Some(StyleObserver::observe(&self.document, &entry.service)),
            remote: entry.remote,
            container: entry.container,
            instance: entry.instance,
            navigate_callback: entry.navigate_callback,
            is_active: true,
            current_theme: entry.theme,
            theme_pending: false,
            liveness: Liveness::new(),
        };
        if let Some(previous) = self.records.insert(id, record) {
            remote_debug!(previous.remote, "replacing record for {}", id);
            previous.teardown();
        }
        id
    }

    /// Unmount and forget the record. Unknown containers are ignored.
    pub fn remove(&self, id: ContainerId) -> bool {
        match self.records.remove(&id) {
            Some((_, record)) => {
                record.teardown();
                true
            }
            None => {
                debug!(container = %id, "remove: no record");
                false
            }
        }
    }

    /// Hide the instance but keep it alive
    pub fn deactivate(&self, id: ContainerId) -> bool {
        let instance = {
            let Some(mut record) = self.records.get_mut(&id) else {
                return false;
            };
            if !record.is_active {
                return true;
            }
            record.is_active = false;
            if let Some(observer) = &record.style_observer {
                observer.pause();
            }
            record.instance.clone()
        };
        instance.on_deactivated();
        true
    }

    /// Show the instance again. Returns the buffered theme if one was flushed.
    pub fn activate(&self, id: ContainerId) -> Option<Theme> {
        let (instance, flush) = {
            let mut record = self.records.get_mut(&id)?;
            if record.is_active {
                return None;
            }
            record.is_active = true;
            if let Some(observer) = &record.style_observer {
                observer.resume();
            }
            let flush = if record.theme_pending {
                record.theme_pending = false;
                record.current_theme
            } else {
                None
            };
            (record.instance.clone(), flush)
        };

        instance.on_activated();
        if let Some(theme) = flush {
            instance.on_theme_change(theme);
        }
        flush
    }

    /// Deliver a theme now, or buffer it until reactivation
    pub fn deliver_theme(&self, id: ContainerId, theme: Theme) {
        let instance = {
            let Some(mut record) = self.records.get_mut(&id) else {
                return;
            };
            if record.is_active {
                if record.current_theme == Some(theme) {
                    return;
                }
                record.current_theme = Some(theme);
                record.instance.clone()
            } else {
                record.current_theme = Some(theme);
                record.theme_pending = true;
                return;
            }
        };
        instance.on_theme_change(theme);
    }

    /// Deliver a theme to every record
    pub fn broadcast_theme(&self, theme: Theme) {
        for id in self.container_ids() {
            self.deliver_theme(id, theme);
        }
    }

    /// Guard for async work done on behalf of the instance in `id`
    pub fn guard(&self, id: ContainerId) -> Option<InstanceGuard> {
        self.records.get(&id).map(|r| r.liveness.guard())
    }

    /// Host navigation handler of the instance, until it is removed
    pub fn navigate_callback(&self, id: ContainerId) -> Option<NavigateCallback> {
        self.records.get(&id).and_then(|r| r.navigate_callback.clone())
    }

    /// Instance handle
    pub fn instance(&self, id: ContainerId) -> Option<Arc<dyn RemoteInstance>> {
        self.records.get(&id).map(|r| r.instance.clone())
    }

    /// Snapshot of one record
    pub fn info(&self, id: ContainerId) -> Option<InstanceInfo> {
        self.records.get(&id).map(|r| InstanceInfo {
            container: id,
            remote: r.remote.clone(),
            is_active: r.is_active,
            current_theme: r.current_theme,
            theme_pending: r.theme_pending,
        })
    }

    /// Whether `id` is registered and visible
    pub fn is_active(&self, id: ContainerId) -> bool {
        self.records.get(&id).is_some_and(|r| r.is_active)
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: ContainerId) -> bool {
        self.records.contains_key(&id)
    }

    /// Every registered container
    pub fn container_ids(&self) -> Vec<ContainerId> {
        self.records.iter().map(|r| *r.key()).collect()
    }

    /// Visible containers
    pub fn active_containers(&self) -> Vec<ContainerId> {
        self.records
            .iter()
            .filter(|r| r.is_active)
            .map(|r| *r.key())
            .collect()
    }

    /// Containers rendering `remote`
    pub fn containers_of(&self, remote: &str) -> Vec<ContainerId> {
        self.records
            .iter()
            .filter(|r| r.remote == remote)
            .map(|r| *r.key())
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no instance is registered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record
    pub fn clear(&self) {
        for id in self.container_ids() {
            self.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        themes: Mutex<Vec<Theme>>,
        activations: AtomicUsize,
        deactivations: AtomicUsize,
        unmounts: AtomicUsize,
    }

    impl RemoteInstance for Recorder {
        fn on_parent_navigate(&self, _path: &str) {}

        fn unmount(&self) {
            self.unmounts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_activated(&self) {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }

        fn on_deactivated(&self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }

        fn on_theme_change(&self, theme: Theme) {
            self.themes.lock().push(theme);
        }
    }

    fn register(registry: &InstanceRegistry, doc: &Document) -> (ContainerId, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let id = registry.insert(NewInstance {
            remote: "shopping".into(),
            service: "shopping".into(),
            container: doc.create_container(),
            instance: recorder.clone(),
            navigate_callback: Some(Arc::new(|_: &str| {})),
            theme: Some(Theme::Light),
        });
        (id, recorder)
    }

    #[test]
    fn test_theme_buffered_while_inactive_flushes_once() {
        let doc = Document::new();
        let registry = InstanceRegistry::new(doc.clone());
        let (id, rec) = register(&registry, &doc);

        registry.deactivate(id);
        registry.deliver_theme(id, Theme::Dark);
        registry.deliver_theme(id, Theme::Light);
        registry.deliver_theme(id, Theme::Dark);
        assert!(rec.themes.lock().is_empty());
        assert!(registry.info(id).unwrap().theme_pending);

        assert_eq!(registry.activate(id), Some(Theme::Dark));
        assert_eq!(*rec.themes.lock(), vec![Theme::Dark]);

        // Nothing left to flush.
        registry.deactivate(id);
        assert_eq!(registry.activate(id), None);
        assert_eq!(rec.themes.lock().len(), 1);
        assert_eq!(rec.activations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_active_delivery_is_immediate_and_deduplicated() {
        let doc = Document::new();
        let registry = InstanceRegistry::new(doc.clone());
        let (id, rec) = register(&registry, &doc);

        registry.deliver_theme(id, Theme::Light);
        registry.deliver_theme(id, Theme::Dark);
        registry.broadcast_theme(Theme::Dark);
        assert_eq!(*rec.themes.lock(), vec![Theme::Dark]);
    }

    #[test]
    fn test_remove_releases_everything() {
        let doc = Document::new();
        let registry = InstanceRegistry::new(doc.clone());
        let (id, rec) = register(&registry, &doc);
        let guard = registry.guard(id).unwrap();
        assert_eq!(doc.live_observer_count(), 1);

        assert!(registry.remove(id));
        assert!(!registry.remove(id));

        assert_eq!(rec.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(doc.live_observer_count(), 0);
        assert!(!guard.is_current());
        assert!(registry.navigate_callback(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_replaces_previous_record() {
        let doc = Document::new();
        let registry = InstanceRegistry::new(doc.clone());
        let container = doc.create_container();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());

        for instance in [first.clone(), second.clone()] {
            registry.insert(NewInstance {
                remote: "blog".into(),
                service: "blog".into(),
                container: container.clone(),
                instance,
                navigate_callback: None,
                theme: None,
            });
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(first.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(second.unmounts.load(Ordering::SeqCst), 0);
        assert_eq!(doc.live_observer_count(), 1);
    }

    #[test]
    fn test_style_observer_tags_only_while_active() {
        let doc = Document::new();
        let registry = InstanceRegistry::new(doc.clone());
        let (id, rec) = register(&registry, &doc);

        let tagged = doc.append_style(".cart{}");
        registry.deactivate(id);
        let foreign = doc.append_style(".post{}");
        registry.activate(id);

        assert_eq!(doc.style_attribute(tagged, DATA_MF_APP_ATTR).as_deref(), Some("shopping"));
        assert_eq!(doc.style_attribute(foreign, DATA_MF_APP_ATTR), None);
        assert_eq!(rec.deactivations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_premarked_styles_are_left_alone() {
        let doc = Document::new();
        let _observer = StyleObserver::observe(&doc, "blog");

        let _other = doc.observe(ObserveTarget::HeadChildren, |records, doc| {
            for r in records {
                if let MutationRecord::ChildAdded(id) = r {
                    if doc.style_attribute(*id, DATA_MF_APP_ATTR).is_none() {
                        doc.set_style_attribute(*id, DATA_MF_APP_ATTR, "host");
                    }
                }
            }
        });
        let id = doc.append_style("body{}");
        assert_eq!(doc.style_attribute(id, DATA_MF_APP_ATTR).as_deref(), Some("blog"));
    }

    #[test]
    fn test_unknown_container_is_tolerated() {
        let doc = Document::new();
        let registry = InstanceRegistry::new(doc.clone());
        let id = ContainerId::random();
        assert!(!registry.deactivate(id));
        assert_eq!(registry.activate(id), None);
        registry.deliver_theme(id, Theme::Dark);
        assert!(registry.guard(id).is_none());
    }
}
