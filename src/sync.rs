//! Initial state sync and guards for late async completions
//!
//! A remote may fetch the host state asynchronously when it mounts. That
//! fetch must never hold up the first render, and its result must be thrown
//! away if the instance was unmounted while it was in flight.

use futures::future::BoxFuture;
use portal_bridge_core::{remote_debug, remote_warn, Error, Result, SyncError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Async producer of a value, shared across mounts
pub type SyncSource<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Owner side of an instance's liveness epoch
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    epoch: Arc<AtomicU64>,
}

impl Liveness {
    /// Create a live epoch
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current epoch
    pub fn guard(&self) -> InstanceGuard {
        InstanceGuard {
            epoch: self.epoch.clone(),
            seen: self.epoch.load(Ordering::Acquire),
        }
    }

    /// Invalidate every guard handed out so far
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

/// Proof that an instance was alive when async work started
#[derive(Debug, Clone)]
pub struct InstanceGuard {
    epoch: Arc<AtomicU64>,
    seen: u64,
}

impl InstanceGuard {
    /// Whether the instance is still the one the guard was taken from
    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::Acquire) == self.seen
    }
}

/// Run `fut` within `timeout`, logging and returning an error on failure
pub async fn try_sync<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Error::Sync(e))) => Err(Error::Sync(e)),
        Ok(Err(e)) => Err(SyncError::Failed(e.to_string()).into()),
        Err(_) => Err(SyncError::Timeout(timeout).into()),
    }
}

/// Run the initial sync, falling back to a default on any failure
pub async fn sync_with_fallback<T, F, D>(label: &str, fut: F, timeout: Duration, fallback: D) -> T
where
    F: Future<Output = Result<T>>,
    D: FnOnce() -> T,
{
    match try_sync(timeout, fut).await {
        Ok(value) => value,
        Err(e) => {
            remote_warn!(label, "initial sync failed, continuing with defaults: {}", e);
            fallback()
        }
    }
}

/// Await `fut` and hand its output to `apply` only if `guard` is still current.
///
/// Returns whether the result was applied.
pub async fn run_guarded<T, F, A>(label: &str, guard: &InstanceGuard, fut: F, apply: A) -> bool
where
    F: Future<Output = T>,
    A: FnOnce(T),
{
    let value = fut.await;
    if guard.is_current() {
        apply(value);
        true
    } else {
        remote_debug!(label, "instance gone, discarding async result");
        false
    }
}
