//! Capability interfaces over the host containers
//!
//! Remotes never see `AuthStore` or `ThemeStore` directly. They get trait
//! objects that expose reading, subscribing and the few actions a remote is
//! allowed to trigger. Anything with `get_state` and `subscribe` is a
//! `StateSource`; the auth and theme adapters add their domain actions on
//! top of that.

use crate::store::{AuthStore, Listener, Subscription, ThemeStore};
use crate::types::{AuthState, ThemeMode, ThemeState};
use std::fmt;
use std::sync::Arc;

/// Something that holds a snapshot and reports its transitions
pub trait StateSource<S>: Send + Sync {
    /// Current snapshot
    fn get_state(&self) -> Arc<S>;

    /// Listen for transitions
    fn subscribe(&self, listener: Listener<S>) -> Subscription;
}

/// Auth capabilities exposed to remotes
pub trait AuthAdapter: StateSource<AuthState> {
    /// Whether the role is granted
    fn has_role(&self, role: &str) -> bool;

    /// Whether at least one of the roles is granted
    fn has_any_role(&self, roles: &[&str]) -> bool;

    /// Whether the user administers `service`
    fn is_service_admin(&self, service: &str) -> bool;

    /// Sign the user out of the whole portal
    fn logout(&self);

    /// Ask the host to start its login flow
    fn request_login(&self, redirect: Option<&str>);

    /// Bearer token as of right now
    fn access_token(&self) -> Option<String>;
}

/// Theme capabilities exposed to remotes
pub trait ThemeAdapter: StateSource<ThemeState> {
    /// Flip the palette
    fn toggle(&self);

    /// Set the user preference
    fn set_mode(&self, mode: ThemeMode);
}

impl StateSource<AuthState> for AuthStore {
    fn get_state(&self) -> Arc<AuthState> {
        AuthStore::get_state(self)
    }

    fn subscribe(&self, listener: Listener<AuthState>) -> Subscription {
        AuthStore::subscribe(self, move |s| listener(s))
    }
}

impl AuthAdapter for AuthStore {
    fn has_role(&self, role: &str) -> bool {
        AuthStore::has_role(self, role)
    }

    fn has_any_role(&self, roles: &[&str]) -> bool {
        AuthStore::has_any_role(self, roles)
    }

    fn is_service_admin(&self, service: &str) -> bool {
        AuthStore::is_service_admin(self, service)
    }

    fn logout(&self) {
        AuthStore::logout(self)
    }

    fn request_login(&self, redirect: Option<&str>) {
        AuthStore::request_login(self, redirect)
    }

    fn access_token(&self) -> Option<String> {
        AuthStore::access_token(self)
    }
}

impl StateSource<ThemeState> for ThemeStore {
    fn get_state(&self) -> Arc<ThemeState> {
        ThemeStore::get_state(self)
    }

    fn subscribe(&self, listener: Listener<ThemeState>) -> Subscription {
        ThemeStore::subscribe(self, move |s| listener(s))
    }
}

impl ThemeAdapter for ThemeStore {
    fn toggle(&self) {
        ThemeStore::toggle(self)
    }

    fn set_mode(&self, mode: ThemeMode) {
        ThemeStore::set_mode(self, mode)
    }
}

/// The state module the host exposes to every remote
#[derive(Clone)]
pub struct PortalStores {
    /// Auth capabilities
    pub auth: Arc<dyn AuthAdapter>,
    /// Theme capabilities
    pub theme: Arc<dyn ThemeAdapter>,
}

impl PortalStores {
    /// Expose the given containers
    pub fn new(auth: &AuthStore, theme: &ThemeStore) -> Self {
        Self {
            auth: Arc::new(auth.clone()),
            theme: Arc::new(theme.clone()),
        }
    }
}

impl fmt::Debug for PortalStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalStores")
            .field("auth", &self.auth.get_state().display_name)
            .field("theme", &self.theme.get_state().resolved_mode)
            .finish()
    }
}
