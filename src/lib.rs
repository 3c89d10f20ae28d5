//! Portal Bridge - Cross-Framework Integration for Micro-Frontend Portals
//!
//! A host shell mounts independently built remote applications into
//! containers it owns and shares one source of truth for auth and theme
//! state with them. The crate covers the host side (registry, keep-alive,
//! navigation mapping, theme push), the remote side (mount bootstrap,
//! navigation bridge, framework bindings) and the shared plumbing between
//! them (initial sync, streaming reconnection, the API client).
#![warn(missing_docs)]

// Core foundational modules
pub mod core;
pub mod dom;
pub mod sync;

// Protocol between host and remotes
pub mod mount;
pub mod navigation;
pub mod registry;
pub mod theme;

// Remote-side consumers
pub mod bindings;
pub mod streaming;
pub mod api;

// Host
pub mod host;

// Re-export commonly used items for convenience
pub use crate::core::{Error, PortalConfig, Result};
pub use dom::{Container, Document};
pub use host::HostShell;
pub use mount::{AppBootstrap, MountOptions, RemoteInstance, RemoteModule};
pub use portal_bridge_core::{AuthStore, PortalStores, Theme, ThemeMode, ThemeStore};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level. Fails if a subscriber is
/// already installed.
pub fn init_logging(config: &crate::core::LoggingConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.pretty().try_init(),
    };
    installed.map_err(|e| Error::internal(format!("logging setup failed: {}", e)))?;

    tracing::info!("Initializing {} v{}", NAME, VERSION);
    Ok(())
}
