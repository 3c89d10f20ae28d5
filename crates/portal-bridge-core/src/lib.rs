//! # Portal Bridge Core
//!
//! Framework-agnostic state shared between the host shell and the remote
//! applications it mounts. This crate is WASM compatible and keeps its
//! dependencies minimal: the data model, the error taxonomy, the snapshot
//! containers for auth and theme state, and the adapter traits remotes
//! consume them through.

#![warn(missing_docs)]

/// Cross-platform logging macros
pub mod logging;

/// Shared constants
pub mod constants;

/// Type definitions for all shared data structures
pub mod types;

/// Snapshot containers for canonical host state
pub mod store;

/// Capability interfaces remotes consume the containers through
pub mod adapter;

// Re-export commonly used items
pub use adapter::{AuthAdapter, PortalStores, StateSource, ThemeAdapter};
pub use store::{AuthStore, Listener, LoginPrompt, SnapshotStore, Subscription, ThemeStore};
pub use types::error::{Error, MountError, Result, StreamError, SyncError};
pub use types::{
    AuthState, ContainerId, PortalUser, ResourceKey, SubscriptionId, Theme, ThemeMode, ThemeState,
    TokenMetadata, UserAuthority, UserProfile,
};
