//! Error types for session-core
//!
//! None of these escape `CallSessionCoordinator::handle`: provider and
//! device failures are turned into `CallEvent`s or logged on the
//! serialized path. They surface from configuration loading and from the
//! adapter and device seams.

use thiserror::Error;

/// Result type for session-core operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur in session-core
#[derive(Debug, Error)]
pub enum SessionError {
    /// Provider refused or failed a transaction
    #[error("Provider rejected {operation}: {reason}")]
    ProviderRejected { operation: String, reason: String },

    /// An audio, alert or haptic device failed
    #[error("Device error ({device}): {message}")]
    Device { device: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    /// Create a provider rejection error
    pub fn provider_rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderRejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a device error
    pub fn device(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SessionError::provider_rejected("start", "busy").to_string(),
            "Provider rejected start: busy"
        );
        assert_eq!(
            SessionError::device("ringer", "asset missing").to_string(),
            "Device error (ringer): asset missing"
        );
        assert_eq!(
            SessionError::config("bad tick").to_string(),
            "Configuration error: bad tick"
        );
    }

    #[test]
    fn test_config_io_keeps_source() {
        use std::error::Error as _;

        let error = SessionError::ConfigIo {
            path: "callvita.toml".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(error.to_string().starts_with("Failed to read configuration file callvita.toml"));
        assert!(error.source().is_some());
    }
}
