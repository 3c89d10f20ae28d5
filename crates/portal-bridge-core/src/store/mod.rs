//! Snapshot containers for canonical host state
//!
//! A `SnapshotStore` holds one immutable snapshot behind an `Arc` and a list
//! of listeners. A transition computes the complete next snapshot first,
//! swaps it in, and only then notifies listeners, in subscription order,
//! exactly once each. A transition started from inside a listener is queued
//! and delivered after the running pass finishes, so two passes never
//! interleave and no listener ever sees a half-built state.

mod auth;
mod theme;

pub use auth::{AuthStore, LoginPrompt};
pub use theme::ThemeStore;

use crate::types::SubscriptionId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback invoked with each new snapshot.
pub type Listener<S> = Arc<dyn Fn(&Arc<S>) + Send + Sync>;

struct ListenerEntry<S> {
    id: SubscriptionId,
    alive: Arc<AtomicBool>,
    listener: Listener<S>,
}

// Manual impl: S itself need not be Clone.
impl<S> Clone for ListenerEntry<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            alive: self.alive.clone(),
            listener: self.listener.clone(),
        }
    }
}

/// A published snapshot together with the listeners registered when it
/// was published.
struct Pending<S> {
    snapshot: Arc<S>,
    audience: Vec<ListenerEntry<S>>,
}

struct Inner<S> {
    current: Arc<S>,
    listeners: Vec<ListenerEntry<S>>,
    pending: VecDeque<Pending<S>>,
    dispatching: bool,
    next_id: u64,
}

/// Single-value pub/sub container with immutable snapshots.
pub struct SnapshotStore<S> {
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S> Clone for SnapshotStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> fmt::Debug for SnapshotStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SnapshotStore")
            .field("listeners", &inner.listeners.len())
            .field("pending", &inner.pending.len())
            .finish()
    }
}

impl<S> SnapshotStore<S>
where
    S: PartialEq + Send + Sync + 'static,
{
    /// Create a store holding `initial`
    pub fn new(initial: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: Arc::new(initial),
                listeners: Vec::new(),
                pending: VecDeque::new(),
                dispatching: false,
                next_id: 1,
            })),
        }
    }

    /// Current snapshot.
    ///
    /// Returns the same `Arc` until the next transition, so callers may use
    /// `Arc::ptr_eq` as a cheap change check.
    pub fn get_state(&self) -> Arc<S> {
        self.inner.lock().current.clone()
    }

    /// Register a listener for every future transition.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        self.subscribe_arc(Arc::new(listener))
    }

    /// Register a pre-built listener.
    pub fn subscribe_arc(&self, listener: Listener<S>) -> Subscription {
        let alive = Arc::new(AtomicBool::new(true));
        let id = {
            let mut inner = self.inner.lock();
            let id = SubscriptionId(inner.next_id);
            inner.next_id += 1;
            inner.listeners.push(ListenerEntry {
                id,
                alive: alive.clone(),
                listener,
            });
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(id, alive, move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().listeners.retain(|entry| entry.id != id);
            }
        })
    }

    /// Number of registered listeners
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Compute the next snapshot from the current one and publish it.
    ///
    /// `f` returning `None`, or a value equal to the current snapshot, is not
    /// a transition and notifies nobody. Returns whether a transition
    /// happened.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&S) -> Option<S>,
    {
        {
            let mut inner = self.inner.lock();
            let next = match f(&inner.current) {
                Some(next) if next != *inner.current => Arc::new(next),
                _ => return false,
            };
            inner.current = next.clone();
            let audience = inner.listeners.clone();
            inner.pending.push_back(Pending {
                snapshot: next,
                audience,
            });
            if inner.dispatching {
                // The pass already running on this or another caller delivers it.
                return true;
            }
            inner.dispatching = true;
        }
        self.drain();
        true
    }

    /// Publish `next` as the new snapshot.
    pub fn replace(&self, next: S) -> bool {
        self.update(|_| Some(next))
    }

    fn drain(&self) {
        let _reset = DispatchReset(&self.inner);
        loop {
            let Pending { snapshot, audience } = {
                let mut inner = self.inner.lock();
                match inner.pending.pop_front() {
                    Some(p) => p,
                    None => {
                        inner.dispatching = false;
                        return;
                    }
                }
            };
            for entry in audience {
                if entry.alive.load(Ordering::Acquire) {
                    (entry.listener)(&snapshot);
                }
            }
        }
    }
}

/// Unblocks the store if a listener panics mid-pass.
struct DispatchReset<'a, S>(&'a Arc<Mutex<Inner<S>>>);

impl<S> Drop for DispatchReset<'_, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut inner = self.0.lock();
            inner.dispatching = false;
            inner.pending.clear();
        }
    }
}

/// Registration on a snapshot container.
///
/// Released explicitly with [`Subscription::unsubscribe`] or implicitly on
/// drop. Releasing twice is a no-op.
pub struct Subscription {
    id: SubscriptionId,
    alive: Arc<AtomicBool>,
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(id: SubscriptionId, alive: Arc<AtomicBool>, detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            alive,
            detach: Some(Box::new(detach)),
        }
    }

    /// Identifier of this registration
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the listener still receives snapshots
    pub fn is_active(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stop receiving snapshots. Idempotent.
    pub fn unsubscribe(&mut self) {
        self.alive.store(false, Ordering::Release);
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
