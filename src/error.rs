//! Custom error types for the client runtime.
//!
//! This module defines the primary error type, `DaqError`, shared by every layer of the
//! crate. Using the `thiserror` crate, it provides a centralized and consistent way to
//! report what went wrong, from socket deadlines to malformed sequence appends.
//!
//! ## Error Hierarchy
//!
//! `DaqError` consolidates the following categories:
//!
//! - **Timeout**: a deadline elapsed. The offending socket has already been closed by the
//!   transport, so the connection must be re-established before it can be used again.
//! - **Connection**: refused/reset/unreachable at connect time, or the peer closed
//!   the stream while an operation was pending (`Connection`, `ConnectionClosed`,
//!   `NotConnected`, `Io`).
//! - **Protocol**: the base station understood the transport but rejected the request
//!   (`Protocol`, `UnexpectedResponse`). These are kept apart from timeouts so callers can
//!   tell "device rejected request" from "device unreachable".
//! - **Shape/Ordering**: a checked `Sequence` append violated monotonic timestamps or
//!   sensor-set matching (`Ordering`, `SensorMismatch`), or a decoder layout did not fit
//!   the receive buffer (`Layout`, `Channel`).
//! - **Configuration**: semantic (`Configuration`) or loading (`Config`) failures.
//!
//! "No data yet" is deliberately *not* an error: `DataClient::wait_for_data` reports it
//! as `false`.

use crate::data::SensorId;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type of the acquisition runtime.
#[derive(Error, Debug)]
pub enum DaqError {
    /// A deadline elapsed before the operation completed. The socket is closed.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation that was aborted (`connect`, `read`, `read_until`, `write`).
        operation: &'static str,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// Connection could not be established.
    #[error("Failed to connect to {address}: {source}")]
    Connection {
        /// Remote `host:port` that was dialed.
        address: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Operation attempted on a transport without an open socket.
    #[error("Transport is not connected")]
    NotConnected,

    /// Remote host closed the stream while data was expected.
    #[error("Connection closed by remote host")]
    ConnectionClosed,

    /// Socket or file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The base station rejected a command (`INVALID COMMAND`, `CANNOT COMPLETE`).
    #[error("Command '{command}' rejected: {response}")]
    Protocol {
        /// Command text as sent, without termination.
        command: String,
        /// Reply returned by the base station.
        response: String,
    },

    /// A reply was received but could not be interpreted.
    #[error("Unexpected response to '{command}': '{response}'")]
    UnexpectedResponse {
        /// Command text as sent, without termination.
        command: String,
        /// Reply returned by the base station.
        response: String,
    },

    /// A monotonic append received a timestamp that does not follow the last element.
    #[error("Frame at t={timestamp} does not follow last frame at t={last}")]
    Ordering {
        /// Timestamp of the rejected frame.
        timestamp: f64,
        /// Timestamp of the current last element.
        last: f64,
    },

    /// A sensor-matching append received a frame with a different sensor set.
    #[error("Frame sensors {found:?} do not match sequence sensors {expected:?}")]
    SensorMismatch {
        /// Sensors of the current last element.
        expected: Vec<SensorId>,
        /// Sensors of the rejected frame.
        found: Vec<SensorId>,
    },

    /// Sensor layout does not fit the receive buffer.
    #[error("Frame layout error: {0}")]
    Layout(String),

    /// Channel index outside the sample.
    #[error("Channel {channel} out of range for sensor {sensor} ({channels} channels)")]
    Channel {
        /// Sensor owning the sample.
        sensor: SensorId,
        /// Requested channel index.
        channel: usize,
        /// Number of channels in the sample.
        channels: usize,
    },

    /// Configuration validation error.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration file or environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A background engine task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),

    /// Export collaborator failure.
    #[cfg(feature = "storage_csv")]
    #[error("Export error: {0}")]
    Export(#[from] csv::Error),
}

impl DaqError {
    /// Whether this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DaqError::Timeout { .. })
    }

    /// Whether the device answered but refused the request.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            DaqError::Protocol { .. } | DaqError::UnexpectedResponse { .. }
        )
    }

    /// Whether the caller can retry without rebuilding configuration.
    ///
    /// Timeouts and connection failures require a reconnect, which is considered
    /// recoverable; validation and layout errors are not.
    pub fn can_recover(&self) -> bool {
        match self {
            DaqError::Timeout { .. }
            | DaqError::Connection { .. }
            | DaqError::NotConnected
            | DaqError::ConnectionClosed
            | DaqError::Io(_)
            | DaqError::Protocol { .. }
            | DaqError::UnexpectedResponse { .. }
            | DaqError::Ordering { .. }
            | DaqError::SensorMismatch { .. } => true,
            DaqError::Layout(_)
            | DaqError::Channel { .. }
            | DaqError::Configuration(_)
            | DaqError::Config(_)
            | DaqError::Task(_) => false,
            #[cfg(feature = "storage_csv")]
            DaqError::Export(_) => false,
        }
    }
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

impl From<tokio::task::JoinError> for DaqError {
    fn from(value: tokio::task::JoinError) -> Self {
        DaqError::Task(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err = DaqError::Timeout {
            operation: "read",
            timeout: Duration::from_millis(10),
        };
        assert!(err.is_timeout());
        assert!(!err.is_protocol());
        assert!(err.can_recover());
        assert_eq!(err.to_string(), "read timed out after 10ms");
    }

    #[test]
    fn test_protocol_is_distinct_from_timeout() {
        let err = DaqError::Protocol {
            command: "SENSOR 1 PAIR".into(),
            response: "CANNOT COMPLETE".into(),
        };
        assert!(err.is_protocol());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_layout_not_recoverable() {
        assert!(!DaqError::Layout("offset past buffer".into()).can_recover());
    }
}
