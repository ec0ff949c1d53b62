//! Error types for telemetry ingestion.
//!
//! All errors implement `std::error::Error` and carry enough structured context to
//! decide whether the operation can simply be retried.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: the telemetry bridge refused or dropped the socket
//! - **State Errors**: an operation was attempted while the channel was not open
//! - **Decode Errors**: an inbound payload was malformed or structurally incomplete
//! - **Override Errors**: a pasted or persisted debug snapshot could not be used
//! - **Storage Errors**: the persistence layer failed to read or write a key
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use racedash::TelemetryError;
//!
//! let error = TelemetryError::connection_failed("bridge not running");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Failed to connect to telemetry bridge: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("INVALID_STATE_ERR: cannot {operation} while channel is {state}")]
    InvalidState { operation: String, state: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Decode error in {context}: {details}")]
    Decode { context: String, details: String },

    #[error(
        "Shared memory version mismatch: expected {expected_major}.{expected_minor}, found {found_major}.{found_minor}"
    )]
    Version { expected_major: i32, expected_minor: i32, found_major: i32, found_minor: i32 },

    #[error("Debug override rejected: {reason}")]
    DebugOverride { reason: String },

    #[error("Storage error for key '{key}'")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("Audio playback failed: {reason}")]
    Audio { reason: String },

    #[error("Field '{field}' not found in snapshot")]
    FieldNotFound { field: String },
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Connection { .. } => true,
            TelemetryError::InvalidState { .. } => true,
            TelemetryError::Timeout { .. } => true,
            TelemetryError::Audio { .. } => true,
            TelemetryError::Storage { .. } => true,
            TelemetryError::Decode { .. } => false,
            TelemetryError::Version { .. } => false,
            TelemetryError::DebugOverride { .. } => false,
            TelemetryError::Config { .. } => false,
            TelemetryError::FieldNotFound { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::Connection { .. } => vec![
                "Ensure RaceRoom is running",
                "Start the shared memory WebSocket bridge",
                "Check the configured address and port",
            ],
            TelemetryError::InvalidState { .. } => vec![
                "Check the channel is open before sending",
                "Wait for the reconnect to complete",
            ],
            TelemetryError::Timeout { .. } => vec![
                "Increase the connect timeout",
                "Check the bridge is responding",
                "Verify no firewall blocks the local port",
            ],
            TelemetryError::Decode { .. } => vec![
                "Verify the bridge sends JSON snapshots",
                "Check the bridge and dash versions match",
            ],
            TelemetryError::Version { .. } => vec![
                "Update the shared memory bridge",
                "Update the dash to a compatible version",
            ],
            TelemetryError::DebugOverride { .. } => vec![
                "Paste a snapshot dumped by the dash",
                "Make sure the snapshot contains DriverData",
            ],
            TelemetryError::Storage { .. } => vec![
                "Check the storage directory exists and is writable",
                "Check file permissions",
            ],
            TelemetryError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Remove unknown or malformed values",
            ],
            TelemetryError::Audio { .. } => {
                vec!["Check the audio output device", "Disable spotter beeps"]
            }
            TelemetryError::FieldNotFound { .. } => vec![
                "Check the field path spelling",
                "Dump the current snapshot to inspect available fields",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for operations attempted in the wrong channel state.
    pub fn invalid_state(operation: impl Into<String>, state: impl std::fmt::Display) -> Self {
        TelemetryError::InvalidState { operation: operation.into(), state: state.to_string() }
    }

    /// Helper constructor for decode errors.
    pub fn decode(context: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Decode { context: context.into(), details: details.into() }
    }

    /// Helper constructor for rejected debug overrides.
    pub fn debug_override(reason: impl Into<String>) -> Self {
        TelemetryError::DebugOverride { reason: reason.into() }
    }

    /// Helper constructor for storage errors with key context.
    pub fn storage(key: impl Into<String>, source: std::io::Error) -> Self {
        TelemetryError::Storage { key: key.into(), source }
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        TelemetryError::Decode { context: "JSON".to_string(), details: err.to_string() }
    }
}

impl From<serde_yaml_ng::Error> for TelemetryError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        TelemetryError::Config { details: err.to_string() }
    }
}
