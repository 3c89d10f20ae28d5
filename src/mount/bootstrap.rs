//! Shared bootstrap for remote applications
//!
//! Every remote needs the same plumbing around its framework root: clean up
//! a previous instance on the same container, start a router behind a
//! navigation bridge, claim `data-service` on the document root, render,
//! optionally pull the host state in the background, and tear all of that
//! down exactly once. [`AppBootstrap`] does this for any [`RootFactory`].

use super::{MountOptions, RemoteInstance, RemoteModule};
use crate::dom::{Container, Document};
use crate::navigation::{NavigationBridge, RemoteRouter};
use crate::sync::{run_guarded, sync_with_fallback, Liveness, SyncSource};
use dashmap::DashMap;
use parking_lot::Mutex;
use portal_bridge_core::constants::DATA_SERVICE_ATTR;
use portal_bridge_core::{
    remote_debug, remote_error, remote_info, remote_warn, ContainerId, MountError, PortalStores, Result, Theme,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// What a root renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderView {
    /// Active route of the remote
    pub path: String,
    /// Palette to render with
    pub theme: Theme,
}

/// A framework application root living in one container
pub trait AppRoot: Send {
    /// Render `view` into the container
    fn render(&mut self, view: &RenderView);

    /// Receive the host state once the initial sync settles. `None` means
    /// the sync failed and the root should keep its defaults.
    fn attach_stores(&mut self, _stores: Option<&PortalStores>) {}

    /// Release everything the root holds
    fn unmount(&mut self);
}

/// Creates framework roots
pub trait RootFactory: Send + Sync {
    /// Create a root for `container`; `bridge` is how the root navigates
    fn create_root(&self, container: &Container, bridge: &NavigationBridge) -> Result<Box<dyn AppRoot>>;
}

impl<F> RootFactory for F
where
    F: Fn(&Container, &NavigationBridge) -> Result<Box<dyn AppRoot>> + Send + Sync,
{
    fn create_root(&self, container: &Container, bridge: &NavigationBridge) -> Result<Box<dyn AppRoot>> {
        self(container, bridge)
    }
}

type InstanceMap = DashMap<ContainerId, Arc<BootstrapInstance>>;

/// Mount protocol implementation shared by remotes
pub struct AppBootstrap {
    name: String,
    data_service: String,
    document: Document,
    factory: Arc<dyn RootFactory>,
    sync: Option<(SyncSource<PortalStores>, Duration)>,
    instances: Arc<InstanceMap>,
}

impl fmt::Debug for AppBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppBootstrap")
            .field("name", &self.name)
            .field("data_service", &self.data_service)
            .field("instances", &self.instances.len())
            .field("sync", &self.sync.as_ref().map(|(_, t)| *t))
            .finish()
    }
}

impl AppBootstrap {
    /// Bootstrap for remote `name` rendering through `factory`
    pub fn new(
        name: impl Into<String>,
        data_service: impl Into<String>,
        document: Document,
        factory: impl RootFactory + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            data_service: data_service.into(),
            document,
            factory: Arc::new(factory),
            sync: None,
            instances: Arc::new(DashMap::new()),
        }
    }

    /// Pull the host state after the first render, giving up after `timeout`
    pub fn with_initial_sync(mut self, source: SyncSource<PortalStores>, timeout: Duration) -> Self {
        self.sync = Some((source, timeout));
        self
    }

    /// Remote name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live instances
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Navigation bridge of the instance in `container`
    pub fn bridge(&self, container: ContainerId) -> Option<NavigationBridge> {
        self.instances.get(&container).map(|i| i.bridge.clone())
    }

    /// Navigate inside the instance in `container`, as a link in the remote would
    pub fn navigate_internal(&self, container: ContainerId, path: &str) -> bool {
        match self.bridge(container) {
            Some(bridge) => bridge.navigate(path),
            None => false,
        }
    }

    fn start_sync(&self, instance: &Arc<BootstrapInstance>) {
        let Some((source, timeout)) = self.sync.clone() else {
            instance.settle(None);
            return;
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                remote_warn!(self.name, "no async runtime for the initial sync, using defaults");
                instance.settle(None);
                return;
            }
        };

        let guard = instance.liveness.guard();
        let instance = instance.clone();
        let fut = source();
        handle.spawn(async move {
            let label = instance.name.clone();
            let stores = sync_with_fallback(&label, async move { fut.await.map(Some) }, timeout, || None).await;
            run_guarded(&label, &guard, async move { stores }, |stores| instance.settle(stores)).await;
        });
    }
}

impl RemoteModule for AppBootstrap {
    fn mount(&self, container: &Container, options: MountOptions) -> Result<Arc<dyn RemoteInstance>> {
        let id = container.id();
        if !container.is_attached() {
            return Err(MountError::ContainerDetached(id).into());
        }

        if let Some((_, previous)) = self.instances.remove(&id) {
            remote_debug!(self.name, "cleaning up previous instance in {}", id);
            previous.unmount();
        }

        let router = RemoteRouter::new();
        let bridge = NavigationBridge::new(self.name.clone(), router.clone(), options.on_navigate.clone());
        let root = match self.factory.create_root(container, &bridge) {
            Ok(root) => root,
            Err(e) => {
                bridge.detach();
                router.reset();
                container.clear();
                remote_error!(self.name, "root creation failed: {}", e);
                return Err(MountError::Initialization {
                    remote: self.name.clone(),
                    reason: e.to_string(),
                }
                .into());
            }
        };

        let instance = Arc::new(BootstrapInstance {
            name: self.name.clone(),
            data_service: self.data_service.clone(),
            document: self.document.clone(),
            container: container.clone(),
            root: Mutex::new(Some(root)),
            dirty: AtomicBool::new(false),
            bridge: bridge.clone(),
            view: Mutex::new(RenderView {
                path: String::new(),
                theme: options.theme.unwrap_or_default(),
            }),
            liveness: Liveness::new(),
            unmounted: AtomicBool::new(false),
            owner: Arc::downgrade(&self.instances),
        });

        let weak = Arc::downgrade(&instance);
        router.after_each(move |change| {
            if let Some(instance) = weak.upgrade() {
                instance.view.lock().path = change.to.clone();
                instance.rerender();
            }
        });

        self.document.set_root_attribute(DATA_SERVICE_ATTR, &self.data_service);
        bridge.start(options.initial_path.as_deref());
        self.instances.insert(id, instance.clone());
        self.start_sync(&instance);

        remote_info!(self.name, "mounted into {} at {:?}", id, bridge.router().current_path());
        Ok(instance as Arc<dyn RemoteInstance>)
    }
}

struct BootstrapInstance {
    name: String,
    data_service: String,
    document: Document,
    container: Container,
    root: Mutex<Option<Box<dyn AppRoot>>>,
    dirty: AtomicBool,
    bridge: NavigationBridge,
    view: Mutex<RenderView>,
    liveness: Liveness,
    unmounted: AtomicBool,
    owner: Weak<InstanceMap>,
}

impl BootstrapInstance {
    // A render that triggers another render (e.g. a redirect) leaves the
    // dirty flag set and the outer loop renders again.
    fn rerender(&self) {
        self.dirty.store(true, Ordering::Release);
        loop {
            let Some(mut root) = self.root.try_lock() else {
                return;
            };
            if !self.dirty.swap(false, Ordering::AcqRel) {
                return;
            }
            let view = self.view.lock().clone();
            match root.as_mut() {
                Some(root) => root.render(&view),
                None => return,
            }
        }
    }

    // Without stores the view is unchanged, so the first render stands.
    fn settle(&self, stores: Option<PortalStores>) {
        if self.unmounted.load(Ordering::Acquire) {
            return;
        }
        if let Some(root) = self.root.lock().as_mut() {
            root.attach_stores(stores.as_ref());
        }
        if stores.is_some() {
            self.rerender();
        }
        self.bridge.ready();
    }
}

impl RemoteInstance for BootstrapInstance {
    fn on_parent_navigate(&self, path: &str) {
        if self.unmounted.load(Ordering::Acquire) {
            remote_debug!(self.name, "ignoring navigation to {} after unmount", path);
            return;
        }
        self.bridge.on_parent_navigate(path);
    }

    fn unmount(&self) {
        if self.unmounted.swap(true, Ordering::AcqRel) {
            remote_debug!(self.name, "unmount called again for {}", self.container.id());
            return;
        }

        self.liveness.invalidate();
        self.bridge.detach();
        if let Some(mut root) = self.root.lock().take() {
            root.unmount();
        }
        self.container.clear();
        self.bridge.router().reset();

        if self.document.root_attribute(DATA_SERVICE_ATTR).as_deref() == Some(self.data_service.as_str()) {
            self.document.remove_root_attribute(DATA_SERVICE_ATTR);
        }

        if let Some(owner) = self.owner.upgrade() {
            owner.remove_if(&self.container.id(), |_, v| std::ptr::eq(Arc::as_ptr(v), self));
        }
        remote_info!(self.name, "unmounted from {}", self.container.id());
    }

    fn on_activated(&self) {
        if self.unmounted.load(Ordering::Acquire) {
            return;
        }
        self.document.set_root_attribute(DATA_SERVICE_ATTR, &self.data_service);
        self.bridge.set_active(true);
    }

    fn on_deactivated(&self) {
        if self.unmounted.load(Ordering::Acquire) {
            return;
        }
        self.bridge.set_active(false);
    }

    fn on_theme_change(&self, theme: Theme) {
        if self.unmounted.load(Ordering::Acquire) {
            return;
        }
        {
            let mut view = self.view.lock();
            if view.theme == theme {
                return;
            }
            view.theme = theme;
        }
        self.rerender();
    }
}
