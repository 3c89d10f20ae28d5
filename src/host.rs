//! Host shell
//!
//! Central state of the portal host: the canonical auth and theme
//! containers, the document, the instance registry, the module loader and
//! the host route. Remotes are mounted through [`HostShell::mount_remote`]
//! and driven by host navigation, keep-alive and theme changes.

use crate::api::SharedApiClient;
use crate::core::{PortalConfig, RemoteConfig};
use crate::dom::{Container, Document};
use crate::mount::{resolve_module, MountOptions, RemoteLoader};
use crate::navigation::{join_route, strip_route, NavigateCallback};
use crate::registry::{InstanceRegistry, NewInstance};
use crate::theme::ThemePropagator;
use parking_lot::Mutex;
use portal_bridge_core::constants::DEFAULT_INITIAL_PATH;
use portal_bridge_core::{
    remote_error, remote_info, AuthStore, ContainerId, Error, MountError, PortalStores, Result, SnapshotStore,
    Subscription, ThemeStore,
};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

struct HostInner {
    config: PortalConfig,
    auth: AuthStore,
    theme: ThemeStore,
    stores: PortalStores,
    document: Document,
    registry: Arc<InstanceRegistry>,
    loader: Arc<dyn RemoteLoader>,
    route: SnapshotStore<String>,
    running: Mutex<Option<Running>>,
}

struct Running {
    propagator: ThemePropagator,
    _subscriptions: Vec<Subscription>,
}

/// The portal host. Clones share the same state.
#[derive(Clone)]
pub struct HostShell {
    inner: Arc<HostInner>,
}

impl fmt::Debug for HostShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostShell")
            .field("name", &self.inner.config.shell.name)
            .field("route", &self.current_path())
            .field("instances", &self.inner.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl HostShell {
    /// Host over `config`, loading remotes through `loader`
    pub fn new(config: PortalConfig, loader: Arc<dyn RemoteLoader>) -> Self {
        let auth = AuthStore::new();
        let theme = ThemeStore::new(config.shell.default_theme);
        let stores = PortalStores::new(&auth, &theme);
        let document = Document::new();
        let registry = Arc::new(InstanceRegistry::new(document.clone()));
        let route = SnapshotStore::new(config.shell.initial_path.clone());

        Self {
            inner: Arc::new(HostInner {
                config,
                auth,
                theme,
                stores,
                document,
                registry,
                loader,
                route,
                running: Mutex::new(None),
            }),
        }
    }

    /// Start following theme changes and login requests. Idempotent.
    pub fn start(&self) {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            return;
        }

        let propagator = ThemePropagator::start(
            &self.inner.theme,
            self.inner.document.clone(),
            self.inner.registry.clone(),
        );

        let route = self.inner.route.clone();
        let login = self.inner.auth.subscribe_login_requests(move |prompt| {
            let redirect = prompt.redirect.clone().unwrap_or_else(|| route.get_state().to_string());
            info!(seq = prompt.seq, redirect = %redirect, "login requested");
        });
        let session = self.inner.auth.subscribe(|state| {
            debug!(
                authenticated = state.is_authenticated,
                user = %state.display_name,
                "session changed"
            );
        });

        *running = Some(Running {
            propagator,
            _subscriptions: vec![login, session],
        });
        info!(shell = %self.inner.config.shell.name, "host shell started");
    }

    /// Whether [`start`](Self::start) ran and [`shutdown`](Self::shutdown) did not
    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .as_ref()
            .is_some_and(|r| r.propagator.is_running())
    }

    /// Load remote `name` and mount it into `container`.
    ///
    /// On failure the container shows the fallback markup and no record is
    /// kept for it.
    pub async fn mount_remote(&self, name: &str, container: &Container) -> Result<ContainerId> {
        let remote = self
            .inner
            .config
            .remote(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("remote '{}'", name)))?;

        if self.inner.registry.remove(container.id()) {
            debug!(container = %container.id(), "replaced previous instance");
        }

        match self.try_mount(&remote, container).await {
            Ok(id) => Ok(id),
            Err(e) => {
                remote_error!(remote.name, "mount into {} failed: {}", container.id(), e);
                container.set_content(self.inner.config.shell.fallback_html.clone());
                Err(e)
            }
        }
    }

    async fn try_mount(&self, remote: &RemoteConfig, container: &Container) -> Result<ContainerId> {
        let exports = self.inner.loader.load(remote).await.map_err(|e| match e {
            Error::Mount(_) => e,
            other => MountError::Unreachable {
                remote: remote.name.clone(),
                reason: other.to_string(),
            }
            .into(),
        })?;
        let module = resolve_module(&remote.name, &exports)?;

        let id = container.id();
        let initial = strip_route(&remote.route_prefix, &self.current_path())
            .unwrap_or_else(|| DEFAULT_INITIAL_PATH.to_string());
        let theme = self.inner.theme.get_state().resolved_mode;

        // The remote only reaches the host through the registry, so removing
        // the record severs the link.
        let weak = Arc::downgrade(&self.inner);
        let options = MountOptions::new()
            .with_initial_path(initial)
            .with_theme(theme)
            .with_on_navigate(move |path| {
                // Hidden instances never move the host route.
                let callback = weak
                    .upgrade()
                    .filter(|inner| inner.registry.is_active(id))
                    .and_then(|inner| inner.registry.navigate_callback(id));
                if let Some(callback) = callback {
                    callback(path);
                }
            });

        let instance = module.mount(container, options)?;

        self.inner.registry.insert(NewInstance {
            remote: remote.name.clone(),
            service: remote.data_service.clone(),
            container: container.clone(),
            instance,
            navigate_callback: Some(route_follower(Arc::downgrade(&self.inner), remote)),
            theme: Some(theme),
        });
        self.inner.theme.set_service(Some(remote.data_service.clone()));

        remote_info!(remote.name, "mounted into {}", id);
        Ok(id)
    }

    /// Navigate the host. Remotes whose prefix owns the path follow it.
    ///
    /// Returns how many instances were told.
    pub fn navigate(&self, host_path: &str) -> usize {
        self.inner.route.replace(host_path.to_string());

        let mut told = 0;
        for id in self.inner.registry.container_ids() {
            let Some(info) = self.inner.registry.info(id) else {
                continue;
            };
            let Some(remote) = self.inner.config.remote(&info.remote) else {
                continue;
            };
            let Some(path) = strip_route(&remote.route_prefix, host_path) else {
                continue;
            };
            if let Some(instance) = self.inner.registry.instance(id) {
                instance.on_parent_navigate(&path);
                told += 1;
            }
        }
        debug!(path = %host_path, remotes = told, "host navigated");
        told
    }

    /// Show a kept-alive instance again
    pub fn activate(&self, id: ContainerId) -> bool {
        if !self.inner.registry.contains(id) {
            debug!(container = %id, "activate: no record");
            return false;
        }
        self.inner.registry.activate(id);
        let service = self
            .inner
            .registry
            .info(id)
            .and_then(|info| self.inner.config.remote(&info.remote).map(|r| r.data_service.clone()));
        if service.is_some() {
            self.inner.theme.set_service(service);
        }
        true
    }

    /// Hide an instance but keep it alive
    pub fn deactivate(&self, id: ContainerId) -> bool {
        self.inner.registry.deactivate(id)
    }

    /// Hide an instance: keep-alive remotes are deactivated, others unmounted
    pub fn hide(&self, id: ContainerId) -> bool {
        let keep_alive = self
            .inner
            .registry
            .info(id)
            .and_then(|info| self.inner.config.remote(&info.remote).map(|r| r.keep_alive))
            .unwrap_or(false);
        if keep_alive {
            self.deactivate(id)
        } else {
            self.unmount(id)
        }
    }

    /// Unmount and forget an instance. Unknown containers are ignored.
    pub fn unmount(&self, id: ContainerId) -> bool {
        self.inner.registry.remove(id)
    }

    /// Unmount everything and stop following the stores
    pub fn shutdown(&self) {
        if let Some(mut running) = self.inner.running.lock().take() {
            running.propagator.stop();
        }
        self.inner.registry.clear();
        info!(shell = %self.inner.config.shell.name, "host shell stopped");
    }

    /// Shared API client authenticated with the live session token
    pub fn api_client(&self) -> Result<SharedApiClient> {
        SharedApiClient::from_auth(&self.inner.config.api, self.inner.stores.auth.clone())
    }

    /// Canonical auth container
    pub fn auth(&self) -> &AuthStore {
        &self.inner.auth
    }

    /// Canonical theme container
    pub fn theme(&self) -> &ThemeStore {
        &self.inner.theme
    }

    /// State module handed to remotes
    pub fn stores(&self) -> PortalStores {
        self.inner.stores.clone()
    }

    /// The host document
    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    /// Instance records
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.inner.registry
    }

    /// Configuration the host runs with
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// Current host path
    pub fn current_path(&self) -> String {
        self.inner.route.get_state().to_string()
    }

    /// Listen for host route changes
    pub fn subscribe_route<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.route.subscribe(move |path| listener(path.as_str()))
    }
}

// Remote-initiated navigation updates the host route only; it is never
// pushed back down.
fn route_follower(host: Weak<HostInner>, remote: &RemoteConfig) -> NavigateCallback {
    let name = remote.name.clone();
    let prefix = remote.route_prefix.clone();
    Arc::new(move |path: &str| {
        let Some(host) = host.upgrade() else {
            return;
        };
        let host_path = join_route(&prefix, path);
        if host.route.replace(host_path.clone()) {
            debug!(remote = %name, path = %host_path, "host route follows remote");
        }
    })
}
