//! Error types and handling for the portal bridge
//!
//! Infrastructure failures (unreachable remotes, failed syncs, dropped
//! streams) are values of these types and are recovered locally by the
//! caller. Logic errors such as a second `unmount()` never surface here:
//! they are tolerated and logged where they happen.

use crate::types::{ContainerId, ResourceKey};
use std::time::Duration;
use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the portal bridge
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A remote could not be mounted
    #[error("Mount failure: {0}")]
    Mount(#[from] MountError),

    /// Initial state sync with the host failed
    #[error("Sync failure: {0}")]
    Sync(#[from] SyncError),

    /// Streaming connection errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// HTTP request errors from the shared API client
    #[error("HTTP error{}: {message}", .status.map(|s| format!(" {}", s)).unwrap_or_default())]
    Http {
        /// Response status, if a response arrived
        status: Option<u16>,
        /// Failure description
        message: String,
    },

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a remote could not be mounted
#[derive(Error, Debug)]
pub enum MountError {
    /// The remote's entry module could not be fetched
    #[error("remote '{remote}' is unreachable: {reason}")]
    Unreachable {
        /// Remote name
        remote: String,
        /// Failure description
        reason: String,
    },

    /// The loaded module does not satisfy the mount contract
    #[error("remote '{remote}' does not satisfy the mount contract: {reason}")]
    InvalidModule {
        /// Remote name
        remote: String,
        /// What is missing or mistyped
        reason: String,
    },

    /// The remote threw while initializing
    #[error("remote '{remote}' failed to initialize: {reason}")]
    Initialization {
        /// Remote name
        remote: String,
        /// Failure description
        reason: String,
    },

    /// The container is not attached to the document
    #[error("container {0} is not attached to the document")]
    ContainerDetached(ContainerId),
}

/// Why the initial auth/theme sync did not complete
#[derive(Error, Debug)]
pub enum SyncError {
    /// No answer within the configured budget
    #[error("sync timed out after {0:?}")]
    Timeout(Duration),

    /// The host answered with an error
    #[error("sync failed: {0}")]
    Failed(String),
}

/// Streaming connection errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Opening the connection failed
    #[error("connect to '{key}' failed: {reason}")]
    Connect {
        /// Resource key
        key: ResourceKey,
        /// Failure description
        reason: String,
    },

    /// The peer closed the connection
    #[error("stream '{0}' closed by peer")]
    Closed(ResourceKey),

    /// The peer sent something unreadable
    #[error("protocol error on '{key}': {reason}")]
    Protocol {
        /// Resource key
        key: ResourceKey,
        /// Failure description
        reason: String,
    },

    /// The retry budget is spent
    #[error("gave up on '{key}' after {attempts} attempts")]
    RetriesExhausted {
        /// Resource key
        key: ResourceKey,
        /// Attempts made
        attempts: u32,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an HTTP error
    pub fn http(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: msg.into(),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Sync(SyncError::Timeout(_)) => true,
            Error::Stream(StreamError::Connect { .. } | StreamError::Closed(_)) => true,
            Error::Http { status, .. } => status.map_or(true, |s| s >= 500),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this is an infrastructure failure (network, missing remote)
    ///
    /// These are recovered locally with a degraded state rather than
    /// propagated to the user.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Error::Mount(MountError::Unreachable { .. })
                | Error::Sync(_)
                | Error::Stream(_)
                | Error::Http { .. }
                | Error::Io(_)
        )
    }
}
