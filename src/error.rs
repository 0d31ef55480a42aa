//! Error types for the blinkybot library.

use thiserror::Error;

use crate::protocol::RejectReason;

/// The main error type for blinkybot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No matching device is attached, or access to it was denied.
    #[error("device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    /// The interface is already claimed by another session.
    #[error("interface {interface} is busy")]
    InterfaceBusy { interface: u8 },

    /// The transport was used after it had been closed.
    #[error("transport closed")]
    TransportClosed,

    /// No response arrived within the configured timeout.
    #[error("timed out after {timeout_ms}ms waiting for a response")]
    Timeout { timeout_ms: u64 },

    /// The device answered with a different opcode than the request expects.
    #[error("unexpected response: expected opcode 0x{expected:02x}, got 0x{actual:02x}")]
    UnexpectedResponse { expected: u8, actual: u8 },

    /// The device refused a command.
    #[error("device rejected opcode 0x{opcode:02x}: {reason}")]
    DeviceRejected { opcode: u8, reason: RejectReason },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// A request argument failed validation before it was sent.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// USB error without a more specific mapping.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame-specific errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A zero-length packet was received.
    #[error("empty packet")]
    Empty,

    /// Packet exceeds the frame size.
    #[error("packet too large: {size} bytes exceeds frame size {max}")]
    TooLarge { size: usize, max: usize },

    /// Payload does not fit after the opcode byte.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Opcode byte is not part of the command set.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Expression slot byte is out of range.
    #[error("invalid expression index {0}")]
    InvalidExpressionIndex(u8),

    /// Expression row uses the bit beyond the 15 matrix columns.
    #[error("expression row {row} has out-of-range bits: 0x{bits:04x}")]
    InvalidExpressionRow { row: usize, bits: u16 },
}

impl Error {
    /// Builds a [`Error::Timeout`] from a duration.
    #[must_use]
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Result type alias for blinkybot operations.
pub type Result<T> = std::result::Result<T, Error>;
