//! Auth binding

use super::{Disposable, ReactiveHolder, StoreBinding};
use portal_bridge_core::{AuthAdapter, AuthState, PortalUser};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Auth state as a framework sees it.
///
/// Views read the local holder. Invokers go to the host adapter; after
/// `dispose` the role checks answer as the anonymous user would.
pub struct AuthBinding<H> {
    binding: StoreBinding<AuthState, H>,
    adapter: Arc<dyn AuthAdapter>,
}

impl<H: ReactiveHolder<AuthState> + 'static> AuthBinding<H> {
    /// Bind to the host auth adapter
    pub fn acquire(adapter: Arc<dyn AuthAdapter>) -> Self {
        Self {
            binding: StoreBinding::acquire(&*adapter),
            adapter,
        }
    }

    /// The framework primitive
    pub fn holder(&self) -> &H {
        self.binding.holder()
    }

    /// Current snapshot
    pub fn state(&self) -> Arc<AuthState> {
        self.binding.get()
    }

    /// Whether a user is signed in
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated
    }

    /// Name shown in the UI
    pub fn display_name(&self) -> String {
        self.state().display_name.clone()
    }

    /// Portal administrator
    pub fn is_admin(&self) -> bool {
        self.state().is_admin
    }

    /// Seller console access
    pub fn is_seller(&self) -> bool {
        self.state().is_seller
    }

    /// Granted roles
    pub fn roles(&self) -> BTreeSet<String> {
        self.state().roles.clone()
    }

    /// Service id to membership tier
    pub fn memberships(&self) -> BTreeMap<String, String> {
        self.state().memberships.clone()
    }

    /// Membership tier for one service
    pub fn membership(&self, service: &str) -> Option<String> {
        self.state().memberships.get(service).cloned()
    }

    /// Signed-in user
    pub fn user(&self) -> Option<PortalUser> {
        self.state().user.clone()
    }

    /// Whether the role is granted
    pub fn has_role(&self, role: &str) -> bool {
        !self.is_disposed() && self.adapter.has_role(role)
    }

    /// Whether at least one role is granted
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        !self.is_disposed() && self.adapter.has_any_role(roles)
    }

    /// Sign out of the whole portal
    pub fn logout(&self) {
        self.adapter.logout();
    }

    /// Ask the host to show its login flow
    pub fn request_login(&self, redirect: Option<&str>) {
        self.adapter.request_login(redirect);
    }

    /// Whether the binding was released
    pub fn is_disposed(&self) -> bool {
        self.binding.is_disposed()
    }
}

impl<H: ReactiveHolder<AuthState> + 'static> Disposable for AuthBinding<H> {
    fn dispose(&self) {
        self.binding.dispose();
    }
}

impl<H> fmt::Debug for AuthBinding<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBinding").field("binding", &self.binding).finish()
    }
}
