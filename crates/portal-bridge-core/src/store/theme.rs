//! Theme container

use super::{SnapshotStore, Subscription};
use crate::types::{ThemeMode, ThemeState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Canonical theme state of the host.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    state: SnapshotStore<ThemeState>,
    system_prefers_dark: Arc<AtomicBool>,
}

impl Default for ThemeStore {
    fn default() -> Self {
        Self::new(ThemeMode::default())
    }
}

impl ThemeStore {
    /// Create a theme container with a light system preference
    pub fn new(mode: ThemeMode) -> Self {
        Self::with_system_preference(mode, false)
    }

    /// Create a theme container with a known system preference
    pub fn with_system_preference(mode: ThemeMode, system_prefers_dark: bool) -> Self {
        Self {
            state: SnapshotStore::new(ThemeState::new(mode, system_prefers_dark)),
            system_prefers_dark: Arc::new(AtomicBool::new(system_prefers_dark)),
        }
    }

    /// Current snapshot
    pub fn get_state(&self) -> Arc<ThemeState> {
        self.state.get_state()
    }

    /// Listen for theme transitions
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<ThemeState>) + Send + Sync + 'static,
    {
        self.state.subscribe(listener)
    }

    /// Flip the palette in effect and pin it as an explicit mode
    pub fn toggle(&self) {
        let dark = self.system_prefers_dark.load(Ordering::Acquire);
        self.state.update(|s| {
            let mode = ThemeMode::from(s.resolved_mode.flipped());
            Some(ThemeState {
                mode,
                resolved_mode: mode.resolve(dark),
                service: s.service.clone(),
            })
        });
        debug!(theme = %self.state.get_state().resolved_mode, "theme toggled");
    }

    /// Set the user preference
    pub fn set_mode(&self, mode: ThemeMode) {
        let dark = self.system_prefers_dark.load(Ordering::Acquire);
        self.state.update(|s| {
            Some(ThemeState {
                mode,
                resolved_mode: mode.resolve(dark),
                service: s.service.clone(),
            })
        });
    }

    /// Record an operating system preference change
    pub fn set_system_prefers_dark(&self, dark: bool) {
        self.system_prefers_dark.store(dark, Ordering::Release);
        self.state.update(|s| {
            Some(ThemeState {
                resolved_mode: s.mode.resolve(dark),
                ..s.clone()
            })
        });
    }

    /// Record which service is in front
    pub fn set_service(&self, service: Option<String>) {
        self.state.update(|s| {
            Some(ThemeState {
                service,
                ..s.clone()
            })
        });
    }
}
