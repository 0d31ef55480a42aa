//! Opcodes for the `BlinkyBot` protocol.
//!
//! Every frame starts with an opcode byte. Queries are answered with the same
//! opcode; mutating commands are answered with their acknowledgement opcode
//! (the command opcode with the high bit set) or with [`Opcode::Reject`].

use std::fmt;

/// Opcodes carried in byte 0 of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Echo a nonce back.
    Ping = 0x01,
    /// Read an expression slot.
    GetExpression = 0x02,
    /// Write an expression slot.
    SetExpression = 0x03,
    /// Read the LED brightness.
    GetBrightness = 0x04,
    /// Write the LED brightness.
    SetBrightness = 0x05,
    /// Read the proximity ADC.
    GetAdc = 0x06,

    // Acknowledgements (0x80 | command)
    /// Expression slot was stored.
    SetExpressionAck = 0x83,
    /// Brightness was stored.
    SetBrightnessAck = 0x85,

    /// Device refused the command.
    Reject = 0xFF,
}

impl Opcode {
    /// Attempts to parse an opcode from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Ping),
            0x02 => Some(Self::GetExpression),
            0x03 => Some(Self::SetExpression),
            0x04 => Some(Self::GetBrightness),
            0x05 => Some(Self::SetBrightness),
            0x06 => Some(Self::GetAdc),
            0x83 => Some(Self::SetExpressionAck),
            0x85 => Some(Self::SetBrightnessAck),
            0xFF => Some(Self::Reject),
            _ => None,
        }
    }

    /// Returns the opcode a well-behaved device answers this command with.
    #[must_use]
    pub const fn response(self) -> Self {
        match self {
            Self::SetExpression => Self::SetExpressionAck,
            Self::SetBrightness => Self::SetBrightnessAck,
            other => other,
        }
    }

    /// Returns true if this opcode is sent by the host.
    #[must_use]
    pub const fn is_command(self) -> bool {
        (self as u8) < 0x80
    }

    /// Returns true if this command changes device state.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::SetExpression | Self::SetBrightness)
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as Self
    }
}

/// Reason code carried by a [`Opcode::Reject`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The device does not implement the command.
    Unsupported,
    /// An argument was out of range.
    InvalidArgument,
    /// Persisting the value to flash failed.
    Storage,
    /// Any other code.
    Unknown(u8),
}

impl RejectReason {
    /// Parses a reason from its wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::Unsupported,
            0x02 => Self::InvalidArgument,
            0x03 => Self::Storage,
            other => Self::Unknown(other),
        }
    }

    /// Encodes the reason to its wire byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Unsupported => 0x01,
            Self::InvalidArgument => 0x02,
            Self::Storage => 0x03,
            Self::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => f.write_str("unsupported command"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::Storage => f.write_str("storage failure"),
            Self::Unknown(code) => write!(f, "unknown reason 0x{code:02x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        assert_eq!(Opcode::Ping as u8, 0x01);
        assert_eq!(Opcode::GetAdc as u8, 0x06);
        assert_eq!(Opcode::SetExpressionAck as u8, 0x80 | Opcode::SetExpression as u8);
        assert_eq!(Opcode::SetBrightnessAck as u8, 0x80 | Opcode::SetBrightness as u8);
    }

    #[test]
    fn test_opcode_from_byte() {
        assert_eq!(Opcode::from_byte(0x03), Some(Opcode::SetExpression));
        assert_eq!(Opcode::from_byte(0xFF), Some(Opcode::Reject));
        assert_eq!(Opcode::from_byte(0x00), None);
        assert_eq!(Opcode::from_byte(0x84), None);
    }

    #[test]
    fn test_response_opcodes() {
        assert_eq!(Opcode::Ping.response(), Opcode::Ping);
        assert_eq!(Opcode::GetExpression.response(), Opcode::GetExpression);
        assert_eq!(Opcode::SetExpression.response(), Opcode::SetExpressionAck);
        assert_eq!(Opcode::SetBrightness.response(), Opcode::SetBrightnessAck);
        assert!(Opcode::SetBrightness.is_mutating());
        assert!(!Opcode::GetBrightness.is_mutating());
        assert!(Opcode::GetAdc.is_command());
        assert!(!Opcode::Reject.is_command());
    }

    #[test]
    fn test_reject_reason_bytes() {
        for byte in [0x01, 0x02, 0x03, 0x42] {
            assert_eq!(RejectReason::from_byte(byte).to_byte(), byte);
        }
        assert_eq!(RejectReason::from_byte(0x03), RejectReason::Storage);
    }
}
