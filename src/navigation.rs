//! Navigation bridge between the host router and a remote's router
//!
//! Two independent routers have to agree on one location. The remote side
//! runs a [`NavigationBridge`] in front of its [`RemoteRouter`]:
//!
//! - A parent-driven navigation is applied silently and never reported back.
//!   A parent path equal to the router's current path is a no-op.
//! - A remote-internal navigation is reported to the host once, and only
//!   when it lands somewhere other than the last path the two sides agreed on.
//! - Parent navigations that arrive before the remote is ready, or while it
//!   is deactivated, are buffered. Only the latest one is replayed.
//!
//! The host side only needs [`join_route`] and [`strip_route`] to translate
//! between its own paths and a remote's logical paths.

use parking_lot::Mutex;
use portal_bridge_core::{remote_debug, constants::DEFAULT_INITIAL_PATH};
use std::fmt;
use std::sync::Arc;

/// Callback the host hands to a remote for remote-initiated navigation
pub type NavigateCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Who asked for a route change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOrigin {
    /// The remote's own links or code
    Internal,
    /// The host, through `on_parent_navigate`
    Parent,
}

/// A committed route change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    /// Path before the change, `None` for the first commit
    pub from: Option<String>,
    /// Path after the change
    pub to: String,
    /// Who asked for it
    pub origin: NavigationOrigin,
}

/// Hook run after every committed change
pub type RouteHook = Arc<dyn Fn(&RouteChange) + Send + Sync>;

#[derive(Default)]
struct RouterInner {
    current: Option<String>,
    history: Vec<String>,
    hooks: Vec<(u64, RouteHook)>,
    next_hook: u64,
}

/// In-memory router of one remote instance
#[derive(Clone, Default)]
pub struct RemoteRouter {
    inner: Arc<Mutex<RouterInner>>,
}

impl fmt::Debug for RemoteRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RemoteRouter")
            .field("current", &inner.current)
            .field("history", &inner.history.len())
            .finish()
    }
}

impl RemoteRouter {
    /// Create a router with no route yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the active route
    pub fn current_path(&self) -> Option<String> {
        self.inner.lock().current.clone()
    }

    /// Every committed path, oldest first
    pub fn history(&self) -> Vec<String> {
        self.inner.lock().history.clone()
    }

    /// Register an after-commit hook; returns its handle
    pub fn after_each<F>(&self, hook: F) -> u64
    where
        F: Fn(&RouteChange) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_hook += 1;
        let id = inner.next_hook;
        inner.hooks.push((id, Arc::new(hook)));
        id
    }

    /// Remove an after-commit hook
    pub fn remove_hook(&self, id: u64) {
        self.inner.lock().hooks.retain(|(h, _)| *h != id);
    }

    /// Commit `path`. Navigating to the active path commits nothing.
    pub fn push(&self, path: &str, origin: NavigationOrigin) -> bool {
        let (change, hooks) = {
            let mut inner = self.inner.lock();
            if inner.current.as_deref() == Some(path) {
                return false;
            }
            let from = inner.current.replace(path.to_string());
            inner.history.push(path.to_string());
            let hooks: Vec<RouteHook> = inner.hooks.iter().map(|(_, h)| h.clone()).collect();
            (
                RouteChange {
                    from,
                    to: path.to_string(),
                    origin,
                },
                hooks,
            )
        };
        for hook in hooks {
            hook(&change);
        }
        true
    }

    /// Forget the route, the history and every hook
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.current = None;
        inner.history.clear();
        inner.hooks.clear();
    }
}

#[derive(Default)]
struct BridgeState {
    ready: bool,
    active: bool,
    agreed_path: Option<String>,
    buffered: Option<String>,
    hook: Option<u64>,
}

struct BridgeInner {
    remote: String,
    router: RemoteRouter,
    on_navigate: Mutex<Option<NavigateCallback>>,
    state: Mutex<BridgeState>,
}

/// Remote side of the navigation protocol
#[derive(Clone)]
pub struct NavigationBridge {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for NavigationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("NavigationBridge")
            .field("remote", &self.inner.remote)
            .field("ready", &state.ready)
            .field("active", &state.active)
            .field("agreed_path", &state.agreed_path)
            .field("buffered", &state.buffered)
            .finish()
    }
}

impl NavigationBridge {
    /// Put a bridge in front of `router`
    pub fn new(remote: impl Into<String>, router: RemoteRouter, on_navigate: Option<NavigateCallback>) -> Self {
        let bridge = Self {
            inner: Arc::new(BridgeInner {
                remote: remote.into(),
                router: router.clone(),
                on_navigate: Mutex::new(on_navigate),
                state: Mutex::new(BridgeState {
                    active: true,
                    ..BridgeState::default()
                }),
            }),
        };

        let weak = Arc::downgrade(&bridge.inner);
        let hook = router.after_each(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.report(change);
            }
        });
        bridge.inner.state.lock().hook = Some(hook);
        bridge
    }

    /// The router behind the bridge
    pub fn router(&self) -> &RemoteRouter {
        &self.inner.router
    }

    /// Apply the initial path without reporting it
    pub fn start(&self, initial: Option<&str>) {
        let path = initial.unwrap_or(DEFAULT_INITIAL_PATH);
        self.inner.state.lock().agreed_path = Some(path.to_string());
        self.inner.router.push(path, NavigationOrigin::Parent);
    }

    /// Mark the first route transition as settled and replay what was buffered
    pub fn ready(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.ready {
                return;
            }
            state.ready = true;
        }
        self.flush();
    }

    /// Whether [`ready`](Self::ready) was called
    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    /// Follow a host navigation
    pub fn on_parent_navigate(&self, path: &str) {
        {
            let mut state = self.inner.state.lock();
            if !state.ready || !state.active {
                remote_debug!(self.inner.remote, "buffering parent navigation to {}", path);
                state.buffered = Some(path.to_string());
                return;
            }
            state.agreed_path = Some(path.to_string());
        }
        // Equal paths commit nothing, which breaks the loop.
        self.inner.router.push(path, NavigationOrigin::Parent);
    }

    /// Navigate from inside the remote
    pub fn navigate(&self, path: &str) -> bool {
        self.inner.router.push(path, NavigationOrigin::Internal)
    }

    /// Suspend or resume following the host. Resuming replays what was buffered.
    pub fn set_active(&self, active: bool) {
        {
            let mut state = self.inner.state.lock();
            if state.active == active {
                return;
            }
            state.active = active;
        }
        if active {
            self.flush();
        }
    }

    /// Path the host and the remote last agreed on
    pub fn agreed_path(&self) -> Option<String> {
        self.inner.state.lock().agreed_path.clone()
    }

    /// Parent navigation waiting for replay
    pub fn buffered_path(&self) -> Option<String> {
        self.inner.state.lock().buffered.clone()
    }

    /// Sever the bridge: drop the host callback, the router hook and the buffer
    pub fn detach(&self) {
        self.inner.on_navigate.lock().take();
        let hook = {
            let mut state = self.inner.state.lock();
            state.buffered = None;
            state.hook.take()
        };
        if let Some(hook) = hook {
            self.inner.router.remove_hook(hook);
        }
    }

    fn flush(&self) {
        let buffered = self.inner.state.lock().buffered.take();
        if let Some(path) = buffered {
            self.on_parent_navigate(&path);
        }
    }
}

impl BridgeInner {
    fn report(&self, change: &RouteChange) {
        if change.origin == NavigationOrigin::Parent {
            return;
        }
        {
            let mut state = self.state.lock();
            if !state.active {
                remote_debug!(self.remote, "not reporting {} while inactive", change.to);
                return;
            }
            if state.agreed_path.as_deref() == Some(change.to.as_str()) {
                return;
            }
            state.agreed_path = Some(change.to.clone());
        }
        let callback = self.on_navigate.lock().clone();
        if let Some(callback) = callback {
            callback(&change.to);
        }
    }
}

/// Host path for a remote path under `prefix`
pub fn join_route(prefix: &str, remote_path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let rest = remote_path.trim_start_matches('/');
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => format!("/{}", rest),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, rest),
    }
}

/// Remote path for a host path, if the host path is under `prefix`
pub fn strip_route(prefix: &str, host_path: &str) -> Option<String> {
    let prefix = prefix.trim_end_matches('/');
    let rest = host_path.strip_prefix(prefix)?;
    match rest.chars().next() {
        None => Some(DEFAULT_INITIAL_PATH.to_string()),
        Some('/') | Some('?') | Some('#') if prefix.is_empty() => Some(rest.to_string()),
        Some('/') => Some(rest.to_string()),
        Some('?') | Some('#') => Some(format!("/{}", rest)),
        Some(_) => None,
    }
}
