use thiserror::Error;

use crate::types::Datapoint;

/// Errors that can occur while relaying rower telemetry
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration file could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Socket server URL cannot be turned into a WebSocket endpoint
    #[error("Invalid socket server URL: {url}")]
    InvalidUrl {
        /// The rejected URL
        url: String,
    },

    /// Transport connection task is gone
    #[error("Transport closed")]
    TransportClosed,

    /// Rower device rejected a command
    #[error("Device error: {0}")]
    Device(String),

    /// A tracked datapoint had no value when read
    #[error("Datapoint {0} has no value")]
    MissingDatapoint(Datapoint),

    /// The device datapoint stream ended
    #[error("Datapoint stream closed")]
    DatapointStreamClosed,

    /// Message (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Check if this error comes from the server connection
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::TransportClosed | Self::InvalidUrl { .. })
    }

    /// Check if this error comes from the rower device
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::Device(_) | Self::MissingDatapoint(_) | Self::DatapointStreamClosed
        )
    }
}
