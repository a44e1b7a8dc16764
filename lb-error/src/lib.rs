//! Unified error handling for Lapbeacon
//!
//! A single error type shared by the core library, the daemon and the debug CLI.
//! Expected signal conditions (timeouts, noise, out-of-range pulse trains) are NOT
//! errors; they are ordinary "no candidate" outcomes of the decoder.

use std::io;
use std::path::PathBuf;

/// Result type alias using LapbeaconError
pub type Result<T> = std::result::Result<T, LapbeaconError>;

/// Unified error type for all Lapbeacon operations
#[derive(thiserror::Error, Debug)]
pub enum LapbeaconError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File too large: {path} ({size} bytes, max {max_size} bytes)")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("GPIO pin {pin} unavailable: {reason}")]
    GpioUnavailable {
        pin: u32,
        reason: String,
    },

    #[error("Failed to read GPIO pin {pin}: {source}")]
    GpioRead {
        pin: u32,
        source: io::Error,
    },

    #[error("Unexpected GPIO value on pin {pin}: {value:?}")]
    GpioValue {
        pin: u32,
        value: u8,
    },

    #[error("Channel {0} is not configured")]
    UnknownChannel(u8),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Service Errors
    // ============================================================================
    #[error("Status server error: {0}")]
    Server(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl LapbeaconError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a GPIO acquisition error
    pub fn gpio_unavailable(pin: u32, reason: impl Into<String>) -> Self {
        Self::GpioUnavailable {
            pin,
            reason: reason.into(),
        }
    }

    /// Create a server error from a string
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Whether this error means a hardware resource could not be acquired.
    /// These are fatal at startup.
    pub fn is_resource_failure(&self) -> bool {
        matches!(self, Self::GpioUnavailable { .. })
    }
}

impl From<String> for LapbeaconError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for LapbeaconError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = LapbeaconError::invalid_config("max_vehicles", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for max_vehicles: must be at least 1"
        );
    }

    #[test]
    fn test_resource_failure_classification() {
        assert!(LapbeaconError::gpio_unavailable(17, "export failed").is_resource_failure());
        assert!(!LapbeaconError::config("bad").is_resource_failure());
        assert!(!LapbeaconError::UnknownChannel(3).is_resource_failure());
    }

    #[test]
    fn test_from_str() {
        let err: LapbeaconError = "boom".into();
        assert!(matches!(err, LapbeaconError::Generic(ref s) if s == "boom"));
    }
}
