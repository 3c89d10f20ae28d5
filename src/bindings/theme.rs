//! Theme binding

use super::{Disposable, ReactiveHolder, StoreBinding};
use portal_bridge_core::{Theme, ThemeAdapter, ThemeMode, ThemeState};
use std::fmt;
use std::sync::Arc;

/// Theme state as a framework sees it
pub struct ThemeBinding<H> {
    binding: StoreBinding<ThemeState, H>,
    adapter: Arc<dyn ThemeAdapter>,
}

impl<H: ReactiveHolder<ThemeState> + 'static> ThemeBinding<H> {
    /// Bind to the host theme adapter
    pub fn acquire(adapter: Arc<dyn ThemeAdapter>) -> Self {
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
    pub fn state(&self) -> Arc<ThemeState> {
        self.binding.get()
    }

    /// Whether the dark palette is in effect
    pub fn is_dark(&self) -> bool {
        self.state().is_dark()
    }

    /// User preference
    pub fn mode(&self) -> ThemeMode {
        self.state().mode
    }

    /// Palette in effect
    pub fn resolved(&self) -> Theme {
        self.state().resolved_mode
    }

    /// Flip the palette
    pub fn toggle(&self) {
        self.adapter.toggle();
    }

    /// Set the user preference
    pub fn set_mode(&self, mode: ThemeMode) {
        self.adapter.set_mode(mode);
    }

    /// Whether the binding was released
    pub fn is_disposed(&self) -> bool {
        self.binding.is_disposed()
    }
}

impl<H: ReactiveHolder<ThemeState> + 'static> Disposable for ThemeBinding<H> {
    fn dispose(&self) {
        self.binding.dispose();
    }
}

impl<H> fmt::Debug for ThemeBinding<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThemeBinding").field("binding", &self.binding).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{SnapshotCell, WatchHolder};
    use portal_bridge_core::ThemeStore;

    #[test]
    fn test_both_holders_agree() {
        let store = ThemeStore::new(ThemeMode::Light);
        let cell: ThemeBinding<SnapshotCell<ThemeState>> = ThemeBinding::acquire(Arc::new(store.clone()));
        let watch: ThemeBinding<WatchHolder<ThemeState>> = ThemeBinding::acquire(Arc::new(store.clone()));

        cell.toggle();
        assert!(cell.is_dark() && watch.is_dark());
        watch.set_mode(ThemeMode::System);
        assert_eq!(cell.mode(), ThemeMode::System);
        assert_eq!(cell.resolved(), watch.resolved());
        assert_eq!(cell.holder().version(), 3);

        cell.dispose();
        assert_eq!(cell.resolved(), Theme::Light);
        assert!(!watch.is_disposed());
    }
}
