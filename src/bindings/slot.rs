//! Module-level binding cache

use super::Disposable;
use parking_lot::{const_mutex, Mutex};
use std::fmt;
use std::sync::Arc;

/// A binding cached in a `static`, surviving mount/unmount cycles.
///
/// ```ignore
/// static AUTH: BindingSlot<AuthBinding<SnapshotCell<AuthState>>> = BindingSlot::new();
/// ```
///
/// The slot is acquired on first use and must be disposed explicitly when
/// the remote unmounts; the next mount acquires a fresh binding.
pub struct BindingSlot<B> {
    slot: Mutex<Option<Arc<B>>>,
}

impl<B> BindingSlot<B> {
    /// An empty slot, usable in a `static`
    pub const fn new() -> Self {
        Self { slot: const_mutex(None) }
    }

    /// Whether a binding is cached
    pub fn is_acquired(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// The cached binding, if any
    pub fn get(&self) -> Option<Arc<B>> {
        self.slot.lock().clone()
    }
}

impl<B: Disposable> BindingSlot<B> {
    /// The cached binding, acquiring it first if the slot is empty
    pub fn get_or_acquire<F>(&self, acquire: F) -> Arc<B>
    where
        F: FnOnce() -> B,
    {
        let mut slot = self.slot.lock();
        if let Some(binding) = slot.as_ref() {
            return binding.clone();
        }
        let binding = Arc::new(acquire());
        *slot = Some(binding.clone());
        binding
    }

    /// Dispose the cached binding and empty the slot
    pub fn dispose(&self) {
        let binding = self.slot.lock().take();
        if let Some(binding) = binding {
            binding.dispose();
        }
    }
}

impl<B> Default for BindingSlot<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> fmt::Debug for BindingSlot<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSlot")
            .field("acquired", &self.is_acquired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{AuthBinding, SnapshotCell};
    use portal_bridge_core::{AuthState, AuthStore, PortalUser, TokenMetadata, UserAuthority, UserProfile};

    static SLOT: BindingSlot<AuthBinding<SnapshotCell<AuthState>>> = BindingSlot::new();

    fn user() -> PortalUser {
        PortalUser {
            profile: UserProfile {
                sub: "u-2".into(),
                email: "park@portal.dev".into(),
                username: None,
                name: Some("Park".into()),
                nickname: None,
                picture: None,
            },
            authority: UserAuthority::default(),
            token: TokenMetadata::issued_now("t"),
        }
    }

    #[test]
    fn test_slot_survives_until_disposed() {
        let store = AuthStore::new();
        store.login(user());

        let first = SLOT.get_or_acquire(|| AuthBinding::acquire(Arc::new(store.clone())));
        let again = SLOT.get_or_acquire(|| unreachable!("already cached"));
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.display_name(), "Park");

        SLOT.dispose();
        assert!(!SLOT.is_acquired());
        // Holders still referenced by components show the anonymous default.
        assert_eq!(*first.state(), AuthState::anonymous());

        store.logout();
        let fresh = SLOT.get_or_acquire(|| AuthBinding::acquire(Arc::new(store.clone())));
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(fresh.display_name(), "Guest");
        SLOT.dispose();
        SLOT.dispose();
    }
}
