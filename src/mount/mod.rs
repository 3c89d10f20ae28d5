//! Mount protocol between the host shell and remote applications
//!
//! A remote exposes exactly one entry point, [`RemoteModule::mount`]. It
//! takes a container the host owns for the lifetime of the instance and
//! returns a [`RemoteInstance`] handle. The loader module validates a
//! dynamically loaded module against this contract; the bootstrap module
//! is the shared helper remotes use to implement it.

pub mod bootstrap;
pub mod loader;

pub use bootstrap::{AppBootstrap, AppRoot, RenderView, RootFactory};
pub use loader::{resolve_module, Export, ModuleExports, RemoteLoader, StaticLoader};

use crate::dom::Container;
pub use crate::navigation::NavigateCallback;
use portal_bridge_core::{Result, Theme};
use std::fmt;
use std::sync::Arc;

/// Options passed to [`RemoteModule::mount`]
#[derive(Clone, Default)]
pub struct MountOptions {
    /// Logical route to render first
    pub initial_path: Option<String>,
    /// Called when the remote's router commits a change the host should follow
    pub on_navigate: Option<NavigateCallback>,
    /// Initial theme
    pub theme: Option<Theme>,
}

impl MountOptions {
    /// Options with nothing set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first route
    pub fn with_initial_path(mut self, path: impl Into<String>) -> Self {
        self.initial_path = Some(path.into());
        self
    }

    /// Set the navigation callback
    pub fn with_on_navigate<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_navigate = Some(Arc::new(callback));
        self
    }

    /// Set the initial theme
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }
}

impl fmt::Debug for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountOptions")
            .field("initial_path", &self.initial_path)
            .field("on_navigate", &self.on_navigate.is_some())
            .field("theme", &self.theme)
            .finish()
    }
}

/// Handle of one mounted remote
pub trait RemoteInstance: Send + Sync {
    /// Follow a host navigation without reporting it back
    fn on_parent_navigate(&self, path: &str);

    /// Tear the instance down. Calling it again does nothing.
    fn unmount(&self);

    /// The container became visible again
    fn on_activated(&self) {}

    /// The container was hidden but kept alive
    fn on_deactivated(&self) {}

    /// The host theme changed
    fn on_theme_change(&self, _theme: Theme) {}
}

/// The entry point every remote exposes
pub trait RemoteModule: Send + Sync {
    /// Mount into `container`, which the caller owns until `unmount`
    fn mount(&self, container: &Container, options: MountOptions) -> Result<Arc<dyn RemoteInstance>>;
}
