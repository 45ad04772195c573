//! Error types for the call client library

use thiserror::Error;

/// Result type for call client operations
pub type CallClientResult<T> = Result<T, CallClientError>;

/// Errors that can occur in the call client
#[derive(Debug, Error)]
pub enum CallClientError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Prerequisites have not completed
    #[error("Client not connected: {message}")]
    NotConnected { message: String },

    /// Operation requested in a state that does not allow it
    #[error("Precondition unmet: {message}")]
    PreconditionUnmet { message: String },

    /// Required device is missing
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    /// Identity/token backend or provider failure
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Calling capability reported a failure
    #[error("Capability error: {message}")]
    Capability { message: String },

    /// Credential cache failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Timeout error
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CallClientError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not-connected error
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::NotConnected {
            message: message.into(),
        }
    }

    /// Create a precondition error
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionUnmet {
            message: message.into(),
        }
    }

    /// Create a device-not-found error
    pub fn device_not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device: device.into(),
        }
    }

    /// Create an upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// Create a capability error
    pub fn capability(message: impl Into<String>) -> Self {
        Self::Capability {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
