//! Framework consumer bindings
//!
//! A binding turns a `StateSource` into a framework's own reactive
//! primitive. Acquire wraps the current snapshot in a [`ReactiveHolder`] and
//! subscribes once; [`Disposable::dispose`] unsubscribes and puts the holder
//! back to the default snapshot. Bindings are kept in a [`BindingSlot`] when
//! the module defining them outlives a single mount.
//!
//! Two holders ship: [`SnapshotCell`] for frameworks that read a snapshot
//! synchronously on render, and [`WatchHolder`] for frameworks that await
//! change notifications. Both behave the same through [`ReactiveHolder`].

mod auth;
mod holder;
mod slot;
mod theme;

pub use auth::AuthBinding;
pub use holder::{SnapshotCell, WatchHolder};
pub use slot::BindingSlot;
pub use theme::ThemeBinding;

use parking_lot::Mutex;
use portal_bridge_core::{StateSource, Subscription};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A framework-native reactive primitive holding a snapshot
pub trait ReactiveHolder<S>: Send + Sync {
    /// Create a holder around `initial`
    fn new(initial: Arc<S>) -> Self
    where
        Self: Sized;

    /// Publish a snapshot to the framework
    fn set(&self, value: Arc<S>);

    /// Snapshot the framework currently sees
    fn get(&self) -> Arc<S>;
}

/// Something with an explicit release step
pub trait Disposable: Send + Sync {
    /// Release subscriptions and reset to defaults. Idempotent.
    fn dispose(&self);
}

/// A subscription feeding a holder
pub struct StoreBinding<S, H> {
    holder: Arc<H>,
    subscription: Mutex<Option<Subscription>>,
    _state: PhantomData<fn() -> S>,
}

impl<S, H> StoreBinding<S, H>
where
    S: Default + Send + Sync + 'static,
    H: ReactiveHolder<S> + 'static,
{
    /// Wrap the current snapshot of `source` and follow it
    pub fn acquire<A>(source: &A) -> Self
    where
        A: StateSource<S> + ?Sized,
    {
        let holder = Arc::new(H::new(source.get_state()));
        let sink = holder.clone();
        let subscription = source.subscribe(Arc::new(move |state: &Arc<S>| sink.set(state.clone())));
        // A transition between the first read and the subscription would be lost.
        holder.set(source.get_state());
        Self {
            holder,
            subscription: Mutex::new(Some(subscription)),
            _state: PhantomData,
        }
    }

    /// The framework primitive
    pub fn holder(&self) -> &H {
        &self.holder
    }

    /// Current snapshot
    pub fn get(&self) -> Arc<S> {
        self.holder.get()
    }

    /// Whether [`dispose`](Disposable::dispose) ran
    pub fn is_disposed(&self) -> bool {
        self.subscription.lock().is_none()
    }
}

impl<S, H> Disposable for StoreBinding<S, H>
where
    S: Default + Send + Sync + 'static,
    H: ReactiveHolder<S> + 'static,
{
    fn dispose(&self) {
        let Some(mut subscription) = self.subscription.lock().take() else {
            return;
        };
        subscription.unsubscribe();
        self.holder.set(Arc::new(S::default()));
    }
}

impl<S, H> fmt::Debug for StoreBinding<S, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBinding")
            .field("subscription", &*self.subscription.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_bridge_core::{ThemeMode, ThemeState, ThemeStore};

    fn follows_store<H: ReactiveHolder<ThemeState> + 'static>() {
        let store = ThemeStore::new(ThemeMode::Light);
        let binding: StoreBinding<ThemeState, H> = StoreBinding::acquire(&store);
        assert!(Arc::ptr_eq(&binding.get(), &store.get_state()));

        store.toggle();
        assert!(binding.get().is_dark());

        binding.dispose();
        binding.dispose();
        assert!(binding.is_disposed());
        assert_eq!(*binding.get(), ThemeState::default());

        store.set_mode(ThemeMode::Dark);
        assert_eq!(*binding.get(), ThemeState::default());
    }

    #[test]
    fn test_snapshot_cell_binding() {
        follows_store::<SnapshotCell<ThemeState>>();
    }

    #[test]
    fn test_watch_holder_binding() {
        follows_store::<WatchHolder<ThemeState>>();
    }
}
