//! Theme delivery to remotes
//!
//! Two channels. The explicit push follows the host `ThemeStore`, writes the
//! palette onto the document root and hands it to every registered instance
//! through the registry (which buffers for hidden ones). Remotes that are
//! not fed explicitly watch the document root attributes instead.

use crate::dom::{Document, MutationObserver, ObserveTarget};
use crate::registry::InstanceRegistry;
use parking_lot::Mutex;
use portal_bridge_core::constants::{CLASS_ATTR, DARK_CLASS, DATA_THEME_ATTR};
use portal_bridge_core::{Subscription, Theme, ThemeStore};
use std::sync::Arc;
use tracing::debug;

/// Write `theme` onto the document root (`data-theme` and the `dark` class)
pub fn apply_to_document(document: &Document, theme: Theme) {
    document.set_root_attribute(DATA_THEME_ATTR, theme.as_str());
    document.toggle_class(DARK_CLASS, theme == Theme::Dark);
}

/// Palette the document root currently advertises.
///
/// `data-theme` wins when it parses; otherwise the `dark` class decides.
pub fn read_from_document(document: &Document) -> Theme {
    document
        .root_attribute(DATA_THEME_ATTR)
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| {
            if document.has_class(DARK_CLASS) {
                Theme::Dark
            } else {
                Theme::Light
            }
        })
}

/// Pushes host theme changes to the document and the registry
pub struct ThemePropagator {
    subscription: Subscription,
}

impl ThemePropagator {
    /// Apply the current theme and follow every later change
    pub fn start(store: &ThemeStore, document: Document, registry: Arc<InstanceRegistry>) -> Self {
        let initial = store.get_state().resolved_mode;
        apply_to_document(&document, initial);

        let last = Mutex::new(initial);
        let subscription = store.subscribe(move |state| {
            let theme = state.resolved_mode;
            {
                let mut last = last.lock();
                if *last == theme {
                    return;
                }
                *last = theme;
            }
            debug!(theme = %theme, "propagating theme");
            apply_to_document(&document, theme);
            registry.broadcast_theme(theme);
        });
        Self { subscription }
    }

    /// Stop following the store
    pub fn stop(&mut self) {
        self.subscription.unsubscribe();
    }

    /// Whether still following the store
    pub fn is_running(&self) -> bool {
        self.subscription.is_active()
    }
}

/// Follows the document root attributes for remotes without an explicit feed
pub struct ThemeAttributeWatcher {
    current: Arc<Mutex<Theme>>,
    observer: MutationObserver,
}

impl ThemeAttributeWatcher {
    /// Watch `document`, calling `on_change` whenever the advertised palette changes
    pub fn new<F>(document: &Document, on_change: F) -> Self
    where
        F: Fn(Theme) + Send + Sync + 'static,
    {
        let current = Arc::new(Mutex::new(read_from_document(document)));
        let seen = current.clone();
        let observer = document.observe(
            ObserveTarget::RootAttributes(vec![CLASS_ATTR.to_string(), DATA_THEME_ATTR.to_string()]),
            move |_, doc| {
                let theme = read_from_document(doc);
                {
                    let mut seen = seen.lock();
                    if *seen == theme {
                        return;
                    }
                    *seen = theme;
                }
                on_change(theme);
            },
        );
        Self { current, observer }
    }

    /// Palette last seen on the document
    pub fn current(&self) -> Theme {
        *self.current.lock()
    }

    /// Stop watching. Also happens on drop.
    pub fn disconnect(&self) {
        self.observer.disconnect();
    }
}
