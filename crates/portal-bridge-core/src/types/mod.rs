//! Type definitions shared by the host shell and its remotes
//!
//! This module contains all type definitions organized by category.

/// Identifier types
pub mod ids;
/// Authentication state
pub mod auth;
/// Theme state
pub mod theme;
/// System-wide error types
pub mod error;

// Re-export commonly used types for convenience
pub use auth::{AuthState, PortalUser, TokenMetadata, UserAuthority, UserProfile};
pub use ids::{ContainerId, ResourceKey, SubscriptionId};
pub use theme::{Theme, ThemeMode, ThemeState};
