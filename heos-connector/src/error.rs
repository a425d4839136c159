//! Error types for the HEOS connector

use thiserror::Error;

/// Errors that can occur while talking to a HEOS controller.
///
/// These are internal plumbing: the public derived operations on
/// [`HeosConnector`](crate::HeosConnector) swallow every variant and degrade
/// to a sentinel value (`false`, empty string, empty map), because the device
/// is advisory-only from the caller's point of view.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No live connection to the controller
    #[error("not connected to the HEOS system")]
    NotConnected,

    /// Command rejected before touching the socket (e.g. empty name)
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Socket-level read/write failure
    #[error("I/O error: {0}")]
    Io(String),

    /// The reply on the wire was for a different command
    #[error("response did not match command {0}")]
    Mismatch(String),

    /// No final reply arrived within the configured timeout
    #[error("timed out waiting for a response to {0}")]
    Timeout(String),
}

/// Type alias for results that can return a ConnectorError
pub type Result<T> = std::result::Result<T, ConnectorError>;

impl From<std::io::Error> for ConnectorError {
    fn from(error: std::io::Error) -> Self {
        ConnectorError::Io(error.to_string())
    }
}
