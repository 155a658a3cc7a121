//! Error types for e2e_core operations.

use crate::phase::Phase;
use std::any::Any;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed cause carried by phase failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error type for e2e_core operations.
#[derive(Error, Debug)]
pub enum E2eError {
    /// An action raised an error while running inside a named phase.
    #[error("{} failed: {description}", .phase.label())]
    PhaseFailed {
        /// Phase the action ran in
        phase: Phase,
        /// Human description given to the phase
        description: String,
        /// The original cause
        #[source]
        source: BoxError,
    },

    /// No probe invocation produced a value before the deadline.
    #[error(
        "condition '{description}' not satisfied within {timeout:?} after {attempts} attempt(s){}",
        last_error_suffix(.last_error)
    )]
    ConditionTimeout {
        /// Description of the awaited condition
        description: String,
        /// The timeout that elapsed
        timeout: Duration,
        /// Number of probe invocations made
        attempts: u32,
        /// Last suppressed probe error, if any
        last_error: Option<String>,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Serialization error while writing reports or configuration.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(err) => format!("; last probe error: {}", err),
        None => String::new(),
    }
}

impl E2eError {
    /// Returns the condition timeout carried by this error, looking through
    /// a phase failure whose cause is a timeout.
    pub fn as_condition_timeout(&self) -> Option<&E2eError> {
        match self {
            Self::ConditionTimeout { .. } => Some(self),
            Self::PhaseFailed { source, .. } => source
                .downcast_ref::<E2eError>()
                .and_then(E2eError::as_condition_timeout),
            _ => None,
        }
    }

    /// True when the condition never succeeded, as opposed to an action failing.
    pub fn is_timeout(&self) -> bool {
        self.as_condition_timeout().is_some()
    }

    /// Returns an operator-facing suggestion for the error, if available.
    pub fn hint(&self) -> Option<&'static str> {
        if self.is_timeout() {
            return Some(
                "The pipeline did not converge in time. Check the probe's last error, or raise the timeout for slower environments.",
            );
        }
        match self {
            Self::ConfigError(_) => {
                Some("Check e2e.toml or the E2E_* environment overrides.")
            }
            _ => None,
        }
    }
}

/// A panic caught while running an action, kept as an error cause.
#[derive(Debug, Clone)]
pub struct PanicError {
    message: String,
}

impl PanicError {
    /// Builds a panic error from the payload returned by `catch_unwind`.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self { message }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panicked: {}", self.message)
    }
}

impl std::error::Error for PanicError {}

/// Convenience Result type for e2e_core operations.
pub type Result<T> = std::result::Result<T, E2eError>;
