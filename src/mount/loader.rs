//! Loading boundary for remote modules
//!
//! Whatever a remote's entry resolves to is treated as a bag of named
//! exports of unknown shape. [`resolve_module`] is the only place that bag is
//! turned into a typed [`RemoteModule`]; anything that does not fit the
//! contract fails here, before the host touches a container.

use super::RemoteModule;
use crate::core::RemoteConfig;
use dashmap::DashMap;
use futures::future::BoxFuture;
use portal_bridge_core::constants::MOUNT_EXPORT;
use portal_bridge_core::{MountError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One named export
#[derive(Clone)]
pub enum Export {
    /// An entry point implementing the mount protocol
    Module(Arc<dyn RemoteModule>),
    /// Plain data
    Value(serde_json::Value),
}

impl Export {
    fn kind(&self) -> &'static str {
        match self {
            Export::Module(_) => "entry point",
            Export::Value(serde_json::Value::Null) => "null",
            Export::Value(serde_json::Value::Bool(_)) => "boolean",
            Export::Value(serde_json::Value::Number(_)) => "number",
            Export::Value(serde_json::Value::String(_)) => "string",
            Export::Value(serde_json::Value::Array(_)) => "array",
            Export::Value(serde_json::Value::Object(_)) => "object",
        }
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Module(_) => f.write_str("Module(..)"),
            Export::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// Named exports of a loaded remote
#[derive(Debug, Clone, Default)]
pub struct ModuleExports {
    exports: HashMap<String, Export>,
}

impl ModuleExports {
    /// No exports
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports with `module` under the `mount` name
    pub fn with_mount(module: Arc<dyn RemoteModule>) -> Self {
        Self::new().with(MOUNT_EXPORT, Export::Module(module))
    }

    /// Add an export
    pub fn with(mut self, name: impl Into<String>, export: Export) -> Self {
        self.exports.insert(name.into(), export);
        self
    }

    /// Look up an export
    pub fn get(&self, name: &str) -> Option<&Export> {
        self.exports.get(name)
    }

    /// Export names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Validate loaded exports against the mount contract
pub fn resolve_module(remote: &str, exports: &ModuleExports) -> Result<Arc<dyn RemoteModule>> {
    match exports.get(MOUNT_EXPORT) {
        Some(Export::Module(module)) => Ok(module.clone()),
        Some(other) => Err(MountError::InvalidModule {
            remote: remote.to_string(),
            reason: format!("export '{}' is a {}, expected an entry point", MOUNT_EXPORT, other.kind()),
        }
        .into()),
        None => Err(MountError::InvalidModule {
            remote: remote.to_string(),
            reason: format!("missing export '{}' (found: {:?})", MOUNT_EXPORT, exports.names()),
        }
        .into()),
    }
}

/// Fetches a remote's exports
pub trait RemoteLoader: Send + Sync {
    /// Load the exports of `remote`
    fn load<'a>(&'a self, remote: &'a RemoteConfig) -> BoxFuture<'a, Result<ModuleExports>>;
}

/// Loader over modules registered in-process
#[derive(Debug, Default)]
pub struct StaticLoader {
    modules: DashMap<String, ModuleExports>,
}

impl StaticLoader {
    /// Empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register exports under a remote name
    pub fn register(&self, remote: impl Into<String>, exports: ModuleExports) {
        self.modules.insert(remote.into(), exports);
    }

    /// Register an entry point under a remote name
    pub fn register_module(&self, remote: impl Into<String>, module: Arc<dyn RemoteModule>) {
        self.register(remote, ModuleExports::with_mount(module));
    }

    /// Forget a remote, making it unreachable
    pub fn unregister(&self, remote: &str) -> bool {
        self.modules.remove(remote).is_some()
    }
}

impl RemoteLoader for StaticLoader {
    fn load<'a>(&'a self, remote: &'a RemoteConfig) -> BoxFuture<'a, Result<ModuleExports>> {
        Box::pin(async move {
            self.modules
                .get(&remote.name)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| {
                    MountError::Unreachable {
                        remote: remote.name.clone(),
                        reason: format!("nothing served at {}", remote.entry),
                    }
                    .into()
                })
        })
    }
}
