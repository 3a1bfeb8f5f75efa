//! Error handling for the twinlink pipeline
//!
//! This module defines the crate-wide error type and a Result alias.
//! Connection failures are generally surfaced as state transitions rather
//! than errors (see [`crate::link::ConnectionState`]); the variants here
//! cover the cases that are reported to callers directly.

use thiserror::Error;

/// Main error type for twinlink operations
#[derive(Error, Debug)]
pub enum TwinLinkError {
    /// Errors from the broker connection or handshake
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish/subscribe attempted while the link cannot accept it
    #[error("not connected to broker")]
    NotConnected,

    /// Errors from the MQTT client request path
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Errors from the payload codec (encrypt/decrypt hook)
    #[error("Codec error: {0}")]
    Codec(String),

    /// Errors decoding a telemetry payload
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication with the transport thread
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TwinLinkError>,
    },
}

impl TwinLinkError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TwinLinkError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for twinlink operations
pub type Result<T> = std::result::Result<T, TwinLinkError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<TwinLinkError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TwinLinkError::Config("missing broker host".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing broker host");
    }

    #[test]
    fn test_not_connected_display() {
        assert_eq!(
            TwinLinkError::NotConnected.to_string(),
            "not connected to broker"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = TwinLinkError::Codec("bad block length".to_string());
        let with_ctx = err.with_context("decoding inbound payload");
        assert!(with_ctx.to_string().contains("decoding inbound payload"));
    }
}
