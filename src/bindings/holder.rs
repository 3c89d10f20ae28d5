//! Reactive holders

use super::ReactiveHolder;
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Lock-free snapshot cell for frameworks that read on render.
///
/// The version moves on every `set`, so a renderer can tell whether it
/// needs to run again without comparing snapshots.
pub struct SnapshotCell<S> {
    value: ArcSwap<S>,
    version: AtomicU64,
}

impl<S> SnapshotCell<S> {
    /// Number of snapshots published since creation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<S: Send + Sync> ReactiveHolder<S> for SnapshotCell<S> {
    fn new(initial: Arc<S>) -> Self {
        Self {
            value: ArcSwap::new(initial),
            version: AtomicU64::new(0),
        }
    }

    fn set(&self, value: Arc<S>) {
        self.value.store(value);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    fn get(&self) -> Arc<S> {
        self.value.load_full()
    }
}

impl<S: fmt::Debug> fmt::Debug for SnapshotCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("value", &*self.value.load())
            .field("version", &self.version())
            .finish()
    }
}

/// Watch channel for frameworks that await changes
pub struct WatchHolder<S> {
    tx: watch::Sender<Arc<S>>,
}

impl<S> WatchHolder<S> {
    /// A receiver that wakes on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.tx.subscribe()
    }
}

impl<S: Send + Sync> ReactiveHolder<S> for WatchHolder<S> {
    fn new(initial: Arc<S>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    fn set(&self, value: Arc<S>) {
        self.tx.send_if_modified(move |current| {
            if Arc::ptr_eq(current, &value) {
                return false;
            }
            *current = value;
            true
        });
    }

    fn get(&self) -> Arc<S> {
        self.tx.borrow().clone()
    }
}

impl<S: fmt::Debug> fmt::Debug for WatchHolder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHolder")
            .field("value", &*self.tx.borrow())
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_versions() {
        let cell = SnapshotCell::new(Arc::new(1u32));
        assert_eq!(cell.version(), 0);
        cell.set(Arc::new(2));
        assert_eq!(*cell.get(), 2);
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn test_watch_wakes_receivers() {
        use tokio_test::{assert_pending, assert_ready_ok, task};

        let holder = WatchHolder::new(Arc::new(1u32));
        let mut rx = holder.subscribe();

        {
            let mut changed = task::spawn(rx.changed());
            assert_pending!(changed.poll());

            let same = holder.get();
            holder.set(same);
            assert!(!changed.is_woken());
            assert_pending!(changed.poll());

            holder.set(Arc::new(5));
            assert!(changed.is_woken());
            assert_ready_ok!(changed.poll());
        }
        assert_eq!(**rx.borrow_and_update(), 5);
    }
}
