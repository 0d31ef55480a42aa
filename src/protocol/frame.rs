//! Fixed-size frames for the `BlinkyBot` protocol.
//!
//! Every transfer in either direction is one full USB packet:
//! ```text
//! ┌──────────┬──────────────────────┬──────────────────┐
//! │  opcode  │  command payload     │  zero padding    │
//! │  1 byte  │  opcode-specific     │  up to 64 bytes  │
//! └──────────┴──────────────────────┴──────────────────┘
//! ```
//! The frame carries no length field; how many payload bytes are meaningful
//! is implied by the opcode.

use std::fmt;

use crate::error::FrameError;

/// Maximum USB packet size, and therefore the size of every frame.
pub const MAX_PACKET_SIZE: usize = 64;

/// Maximum payload after the opcode byte.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - 1;

/// A single protocol frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    bytes: [u8; MAX_PACKET_SIZE],
}

impl Frame {
    /// Builds a frame from an opcode byte and payload, zero-filling the rest.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLarge`] if the payload does not fit.
    pub fn new(opcode: u8, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut bytes = [0u8; MAX_PACKET_SIZE];
        bytes[0] = opcode;
        bytes[1..=payload.len()].copy_from_slice(payload);
        Ok(Self { bytes })
    }

    /// Wraps a full packet.
    pub(crate) const fn from_bytes(bytes: [u8; MAX_PACKET_SIZE]) -> Self {
        Self { bytes }
    }

    /// Builds a frame from a received packet.
    ///
    /// Short packets are zero-extended to the frame size.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the packet is empty or longer than a frame.
    pub fn from_packet(packet: &[u8]) -> Result<Self, FrameError> {
        if packet.is_empty() {
            return Err(FrameError::Empty);
        }
        if packet.len() > MAX_PACKET_SIZE {
            return Err(FrameError::TooLarge {
                size: packet.len(),
                max: MAX_PACKET_SIZE,
            });
        }

        let mut bytes = [0u8; MAX_PACKET_SIZE];
        bytes[..packet.len()].copy_from_slice(packet);
        Ok(Self { bytes })
    }

    /// Returns the opcode byte.
    #[must_use]
    pub const fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    /// Returns the payload, including trailing padding.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..]
    }

    /// Returns the full frame.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MAX_PACKET_SIZE] {
        &self.bytes
    }

    /// Returns the frame bytes up to the last non-zero byte, hex-encoded.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let used = self
            .bytes
            .iter()
            .rposition(|&b| b != 0)
            .map_or(1, |pos| pos + 1);
        hex::encode(&self.bytes[..used])
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("opcode", &format_args!("0x{:02x}", self.opcode()))
            .field("bytes", &self.to_hex())
            .finish()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_zero_pads() {
        let frame = Frame::new(0x05, &[200]).unwrap();

        assert_eq!(frame.as_bytes().len(), MAX_PACKET_SIZE);
        assert_eq!(frame.opcode(), 0x05);
        assert_eq!(frame.payload()[0], 200);
        assert!(frame.payload()[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_new_accepts_full_payload() {
        let payload = [0xAA; MAX_PAYLOAD_SIZE];
        let frame = Frame::new(0x01, &payload).unwrap();
        assert_eq!(frame.payload(), &payload[..]);
    }

    #[test]
    fn test_new_rejects_oversized_payload() {
        let payload = [0u8; MAX_PACKET_SIZE];
        assert_eq!(
            Frame::new(0x01, &payload),
            Err(FrameError::PayloadTooLarge {
                size: MAX_PACKET_SIZE,
                max: MAX_PAYLOAD_SIZE
            })
        );
    }

    #[test]
    fn test_from_short_packet() {
        let frame = Frame::from_packet(&[0x04, 0x2f]).unwrap();
        assert_eq!(frame, Frame::new(0x04, &[0x2f]).unwrap());
    }

    #[test]
    fn test_from_invalid_packets() {
        assert_eq!(Frame::from_packet(&[]), Err(FrameError::Empty));
        assert_eq!(
            Frame::from_packet(&[0u8; 65]),
            Err(FrameError::TooLarge { size: 65, max: 64 })
        );
    }

    #[test]
    fn test_to_hex_trims_padding() {
        let frame = Frame::new(0x01, &[0x78, 0x56, 0x34, 0x12]).unwrap();
        assert_eq!(frame.to_hex(), "0178563412");

        let bare = Frame::new(0x06, &[]).unwrap();
        assert_eq!(bare.to_hex(), "06");
    }
}
