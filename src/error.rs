//! Error types for esplink.

use thiserror::Error;

use crate::protocol::DeviceId;

/// Main error type for all esplink operations.
#[derive(Debug, Error)]
pub enum EspError {
    /// A known packet id arrived with a payload that does not match its
    /// expected shape. Carries the raw payload for diagnostics.
    #[error("malformed payload for packet id {packet_id:#04X} ({} bytes)", .payload.len())]
    MalformedPayload {
        /// Wire packet id.
        packet_id: u8,
        /// Raw payload bytes as received.
        payload: bytes::Bytes,
    },

    /// No matching response arrived within the request deadline.
    #[error("request timed out waiting for response id {0:#04X}")]
    RequestTimeout(u8),

    /// A request with the same correlation key is already outstanding.
    #[error("a request awaiting response id {0:#04X} from {1} is already in flight")]
    RequestInFlight(u8, DeviceId),

    /// The request was cancelled before a response arrived.
    #[error("request cancelled")]
    RequestCancelled,

    /// The device reported it could not process the request.
    #[error("device {device} rejected request id {request_id:#04X}: {reason}")]
    RequestRejected {
        /// Device that reported the failure.
        device: DeviceId,
        /// Packet id of the rejected request.
        request_id: u8,
        /// Device-reported reason (unsupported, not processed, data error).
        reason: &'static str,
    },

    /// The device rejected one definition of a sweep write batch; carries
    /// the 1-based index of the offending definition.
    #[error("sweep definition {0} contains invalid data")]
    SweepWriteFailed(u8),

    /// The transport dropped while the operation was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// The session is not in a state that allows the operation.
    #[error("not connected")]
    NotConnected,

    /// Opening the transport failed.
    #[error("transport open failed: {0}")]
    TransportOpen(String),

    /// The transport did not acknowledge a write within the bounded timeout.
    #[error("write not acknowledged by transport in time")]
    WriteAckTimeout,

    /// A received payload could not be interpreted as the requested domain
    /// value (e.g. a version string that is not numeric).
    #[error("invalid response data: {0}")]
    InvalidData(&'static str),

    /// I/O error from a stream-backed transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using EspError.
pub type Result<T> = std::result::Result<T, EspError>;
