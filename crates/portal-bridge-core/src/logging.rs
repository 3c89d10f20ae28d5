//! Cross-platform logging scoped to a remote application
//!
//! Every line a remote logs is tagged with the remote's name. On native
//! targets the name becomes a `remote` field on a `tracing` event; on WASM
//! targets the line goes to the browser console prefixed with `[name]`.

/// Info level event for a named remote
#[macro_export]
macro_rules! remote_info {
    ($remote:expr, $($arg:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        web_sys::console::log_1(&format!("[{}] {}", $remote, format!($($arg)*)).into());

        #[cfg(not(target_arch = "wasm32"))]
        tracing::info!(remote = %$remote, $($arg)*);
    }};
}

/// Warning level event for a named remote
#[macro_export]
macro_rules! remote_warn {
    ($remote:expr, $($arg:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        web_sys::console::warn_1(&format!("[{}] {}", $remote, format!($($arg)*)).into());

        #[cfg(not(target_arch = "wasm32"))]
        tracing::warn!(remote = %$remote, $($arg)*);
    }};
}

/// Error level event for a named remote
#[macro_export]
macro_rules! remote_error {
    ($remote:expr, $($arg:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        web_sys::console::error_1(&format!("[{}] {}", $remote, format!($($arg)*)).into());

        #[cfg(not(target_arch = "wasm32"))]
        tracing::error!(remote = %$remote, $($arg)*);
    }};
}

/// Debug level event for a named remote
#[macro_export]
macro_rules! remote_debug {
    ($remote:expr, $($arg:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        web_sys::console::debug_1(&format!("[{}] {}", $remote, format!($($arg)*)).into());

        #[cfg(not(target_arch = "wasm32"))]
        tracing::debug!(remote = %$remote, $($arg)*);
    }};
}
