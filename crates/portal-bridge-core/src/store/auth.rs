//! Auth container

use super::{SnapshotStore, Subscription};
use crate::types::error::{Error, Result};
use crate::types::{AuthState, PortalUser, TokenMetadata};
use std::sync::Arc;
use tracing::{debug, info};

/// Request for the host to show its login flow.
///
/// `seq` increases with every request so that two requests for the same
/// redirect are still two transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginPrompt {
    /// Monotonic request number, 0 before the first request
    pub seq: u64,
    /// Path to come back to after login
    pub redirect: Option<String>,
}

/// Canonical authentication state of the host.
///
/// Clones share the same underlying containers.
#[derive(Debug, Clone)]
pub struct AuthStore {
    state: SnapshotStore<AuthState>,
    prompts: SnapshotStore<LoginPrompt>,
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStore {
    /// Create an anonymous auth container
    pub fn new() -> Self {
        Self {
            state: SnapshotStore::new(AuthState::anonymous()),
            prompts: SnapshotStore::new(LoginPrompt::default()),
        }
    }

    /// Current snapshot
    pub fn get_state(&self) -> Arc<AuthState> {
        self.state.get_state()
    }

    /// Listen for auth transitions
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<AuthState>) + Send + Sync + 'static,
    {
        self.state.subscribe(listener)
    }

    /// Sign `user` in. The credential exchange happened elsewhere.
    pub fn login(&self, user: PortalUser) {
        let name = user.display_name();
        if self.state.replace(AuthState::from_user(user)) {
            info!(user = %name, "signed in");
        }
    }

    /// Sign out. Every subscriber sees the anonymous snapshot in one pass.
    pub fn logout(&self) {
        if self.state.replace(AuthState::anonymous()) {
            info!("signed out");
        }
    }

    /// Restore a session found at startup, or stay anonymous
    pub fn restore(&self, user: Option<PortalUser>) {
        match user {
            Some(user) => self.login(user),
            None => {
                debug!("no session to restore");
                self.logout();
            }
        }
    }

    /// Swap in a refreshed token for the signed-in user
    pub fn refresh_token(&self, token: TokenMetadata) -> Result<()> {
        if !self.state.get_state().is_authenticated {
            return Err(Error::invalid_input("cannot refresh the token of an anonymous session"));
        }
        self.state.update(|current| {
            let mut user = current.user.clone()?;
            user.token = token;
            Some(AuthState::from_user(user))
        });
        debug!("access token refreshed");
        Ok(())
    }

    /// Whether the role is granted
    pub fn has_role(&self, role: &str) -> bool {
        self.state.get_state().has_role(role)
    }

    /// Whether at least one role is granted
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        self.state.get_state().has_any_role(roles)
    }

    /// Whether the user administers `service`
    pub fn is_service_admin(&self, service: &str) -> bool {
        self.state.get_state().is_service_admin(service)
    }

    /// Bearer token as of right now
    pub fn access_token(&self) -> Option<String> {
        self.state.get_state().access_token().map(str::to_string)
    }

    /// Ask the host to start its login flow
    pub fn request_login(&self, redirect: Option<&str>) {
        let redirect = redirect.map(str::to_string);
        self.prompts.update(|prev| {
            Some(LoginPrompt {
                seq: prev.seq + 1,
                redirect,
            })
        });
    }

    /// Listen for login requests
    pub fn subscribe_login_requests<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<LoginPrompt>) + Send + Sync + 'static,
    {
        self.prompts.subscribe(listener)
    }

    /// Most recent login request
    pub fn last_login_request(&self) -> Arc<LoginPrompt> {
        self.prompts.get_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::auth::fixtures::user;
    use parking_lot::Mutex;

    #[test]
    fn test_login_then_logout() {
        let store = AuthStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        let _sub = store.subscribe(move |s| seen_c.lock().push(s.is_authenticated));

        store.login(user(&["ROLE_USER"]));
        assert_eq!(store.get_state().display_name, "kim");
        assert_eq!(store.access_token().as_deref(), Some("token-1"));

        store.logout();
        assert_eq!(*store.get_state(), AuthState::anonymous());
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[test]
    fn test_logout_when_anonymous_is_silent() {
        let store = AuthStore::new();
        let calls = Arc::new(Mutex::new(0));
        let calls_c = calls.clone();
        let _sub = store.subscribe(move |_| *calls_c.lock() += 1);

        store.logout();
        store.restore(None);
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_refresh_token() {
        let store = AuthStore::new();
        assert!(store.refresh_token(TokenMetadata::issued_now("x")).is_err());

        store.login(user(&[]));
        store.refresh_token(TokenMetadata::issued_now("token-2")).unwrap();
        assert_eq!(store.access_token().as_deref(), Some("token-2"));
        assert!(store.get_state().is_authenticated);
    }

    #[test]
    fn test_role_queries() {
        let store = AuthStore::new();
        store.restore(Some(user(&["ROLE_BLOG_ADMIN"])));
        assert!(store.has_role("ROLE_BLOG_ADMIN"));
        assert!(store.has_any_role(&["ROLE_SELLER", "ROLE_BLOG_ADMIN"]));
        assert!(store.is_service_admin("blog"));
        assert!(!store.is_service_admin("shopping"));
    }

    #[test]
    fn test_repeated_login_requests_are_distinct() {
        let store = AuthStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        let _sub = store.subscribe_login_requests(move |p| seen_c.lock().push(p.seq));

        store.request_login(Some("/shopping/cart"));
        store.request_login(Some("/shopping/cart"));
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(store.last_login_request().redirect.as_deref(), Some("/shopping/cart"));
    }
}
