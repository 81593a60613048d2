//! Error types for pooling and lifecycle operations
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::pool::HandleId;

/// Result type for resource operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by factory failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Comprehensive error type for pool and lifecycle operations
#[derive(Error, Debug)]
pub enum Error {
    /// Pool or component configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// The pool was used before `init`
    #[error("Pool '{resource_id}' is not initialized")]
    NotInitialized {
        /// The resource identifier
        resource_id: String,
    },

    /// The pool is shutting down or closed
    #[error("Pool '{resource_id}' is closed")]
    Closed {
        /// The resource identifier
        resource_id: String,
    },

    /// Eager creation during `init` failed; the attempt was rolled back
    #[error("Initialization failed for pool '{resource_id}': {source}")]
    Initialization {
        /// The resource identifier
        resource_id: String,
        /// The factory error that aborted initialization
        #[source]
        source: Box<Error>,
    },

    /// The factory could not create a new handle
    #[error("Failed to create handle for '{resource_id}': {reason}")]
    Create {
        /// The resource identifier
        resource_id: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// The factory could not tear down a handle
    #[error("Failed to destroy handle of '{resource_id}': {reason}")]
    Destroy {
        /// The resource identifier
        resource_id: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// One or more handles failed to close; every other handle was still closed
    #[error("Failed to destroy {} handle(s) of '{resource_id}'", .failures.len())]
    Close {
        /// The resource identifier
        resource_id: String,
        /// Per-handle failures
        failures: Vec<DestroyFailure>,
    },

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms for resource '{resource_id}'")]
    Timeout {
        /// The resource identifier
        resource_id: String,
        /// The timeout duration in milliseconds
        timeout_ms: u64,
        /// The operation that timed out
        operation: String,
    },

    /// A component with the same name is already attached
    #[error("Component '{name}' is already attached")]
    AlreadyAttached {
        /// The component name
        name: String,
    },

    /// A component failed to start; later components were not started
    #[error("Component '{component}' failed to start: {source}")]
    Startup {
        /// The component name
        component: String,
        /// The start failure
        #[source]
        source: Box<Error>,
    },

    /// A backend gave up reconnecting
    #[error("Gave up reconnecting '{resource_id}' after {attempts} attempt(s)")]
    ReconnectExhausted {
        /// The resource identifier
        resource_id: String,
        /// Attempts made before giving up
        attempts: u32,
        /// The last connection error
        #[source]
        source: Option<Box<Error>>,
    },

    /// The operation was cancelled by a stop request
    #[error("Operation on '{resource_id}' was cancelled")]
    Cancelled {
        /// The resource identifier
        resource_id: String,
    },
}

/// A single handle that failed to close during [`Pool::close`](crate::pool::Pool::close).
#[derive(Debug)]
pub struct DestroyFailure {
    /// The handle that failed
    pub handle: HandleId,
    /// What the factory reported
    pub error: Error,
}

impl fmt::Display for DestroyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle {}: {}", self.handle, self.error)
    }
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not-initialized error
    pub fn not_initialized(resource_id: impl Into<String>) -> Self {
        Self::NotInitialized {
            resource_id: resource_id.into(),
        }
    }

    /// Create a closed error
    pub fn closed(resource_id: impl Into<String>) -> Self {
        Self::Closed {
            resource_id: resource_id.into(),
        }
    }

    /// Create a handle-creation error without an underlying source
    pub fn create(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Create {
            resource_id: resource_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a handle-creation error from an underlying error
    pub fn create_from<E>(resource_id: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Create {
            resource_id: resource_id.into(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a handle-teardown error without an underlying source
    pub fn destroy(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Destroy {
            resource_id: resource_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a handle-teardown error from an underlying error
    pub fn destroy_from<E>(resource_id: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Destroy {
            resource_id: resource_id.into(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error
    pub fn timeout(
        resource_id: impl Into<String>,
        limit: Duration,
        operation: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            resource_id: resource_id.into(),
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            operation: operation.into(),
        }
    }

    /// Wrap a factory failure that aborted `init`
    pub fn initialization(resource_id: impl Into<String>, source: Error) -> Self {
        Self::Initialization {
            resource_id: resource_id.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Create { .. } | Self::Timeout { .. } => true,
            Self::Initialization { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get the resource ID associated with this error (if any)
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. }
            | Self::AlreadyAttached { .. }
            | Self::Startup { .. } => None,
            Self::NotInitialized { resource_id }
            | Self::Closed { resource_id }
            | Self::Initialization { resource_id, .. }
            | Self::Create { resource_id, .. }
            | Self::Destroy { resource_id, .. }
            | Self::Close { resource_id, .. }
            | Self::Timeout { resource_id, .. }
            | Self::ReconnectExhausted { resource_id, .. }
            | Self::Cancelled { resource_id } => Some(resource_id),
        }
    }
}
