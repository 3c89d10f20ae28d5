//! Core host foundations
//!
//! Configuration lives here; the error taxonomy and the shared state
//! containers come from `portal_bridge_core`.

pub mod config;

// Re-export commonly used items
pub use config::{ApiConfig, LoggingConfig, PortalConfig, RemoteConfig, ShellConfig, StreamingConfig};
pub use portal_bridge_core::{Error, Result};
