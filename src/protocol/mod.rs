//! Protocol definitions for `BlinkyBot` communication.
//!
//! This module contains the low-level protocol types including:
//! - Fixed-size frame construction
//! - Opcodes and reject reasons
//! - Typed request/response encoding

pub mod codec;
pub mod frame;
pub mod opcode;

pub use codec::{Request, Response};
pub use frame::{Frame, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};
pub use opcode::{Opcode, RejectReason};
