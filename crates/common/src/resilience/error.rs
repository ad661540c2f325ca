//! Error types for protected calls and breaker configuration

use std::time::Duration;

use thiserror::Error;

/// Simple configuration error for validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors returned by a protected call.
///
/// Generic over the operation's own error type `E`, which is carried through
/// unchanged in [`ResilienceError::OperationFailed`].
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker rejected the call without invoking the operation
    #[error("Circuit breaker for '{service}' is open, rejecting calls")]
    CircuitOpen { service: String },

    /// No breaker exists for the service and auto-registration is off
    #[error("No circuit breaker registered for '{service}'")]
    NotRegistered { service: String },

    /// The operation returned after the caller-supplied deadline
    #[error("Operation exceeded call timeout of {timeout:?} (took {elapsed:?})")]
    Timeout { timeout: Duration, elapsed: Duration },

    /// The operation itself failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },

    /// The operation panicked; the panic was caught and counted as a failure
    #[error("Operation panicked: {message}")]
    Panicked { message: String },

    /// The breaker configuration supplied for auto-registration was invalid
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// True when the breaker rejected the call outright
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// True when the failure came from running the operation
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Self::OperationFailed { .. } | Self::Timeout { .. } | Self::Panicked { .. })
    }

    /// Borrow the wrapped operation error, if any
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            _ => None,
        }
    }

    /// Metric label for this outcome (`circuit_open` or `error`)
    pub fn status_label(&self) -> &'static str {
        if self.is_circuit_open() {
            "circuit_open"
        } else {
            "error"
        }
    }
}

impl<E> From<ConfigError> for ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid { message } => Self::InvalidConfiguration { message },
        }
    }
}

/// Result type for protected calls
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;
