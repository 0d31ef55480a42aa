//! Typed request/response encoding for the `BlinkyBot` protocol.
//!
//! Payload layouts (all integers little-endian):
//! ```text
//! Ping            [nonce:4]
//! GetExpression   [index:1]                  -> [index:1] [rows:7x2]
//! SetExpression   [index:1] [rows:7x2]       -> ack [index:1]
//! GetBrightness   -                          -> [brightness:1]
//! SetBrightness   [brightness:1]             -> ack [brightness:1]
//! GetAdc          -                          -> [sample:2]
//! Reject          [rejected opcode:1] [reason:1]
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, FrameError, Result};
use crate::protocol::frame::{Frame, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};
use crate::protocol::opcode::{Opcode, RejectReason};
use crate::types::{AdcReading, Expression, ExpressionIndex, MATRIX_HEIGHT};

/// Requests the host sends to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Echo a nonce.
    Ping(u32),
    /// Read an expression slot.
    GetExpression(ExpressionIndex),
    /// Write an expression slot.
    SetExpression {
        index: ExpressionIndex,
        expression: Expression,
    },
    /// Read the LED brightness.
    GetBrightness,
    /// Write the LED brightness.
    SetBrightness(u8),
    /// Read the proximity ADC.
    GetAdc,
}

/// Responses the device sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Echoed ping nonce.
    Pong(u32),
    /// Contents of an expression slot.
    Expression {
        index: ExpressionIndex,
        expression: Expression,
    },
    /// Acknowledges a stored expression.
    ExpressionStored(ExpressionIndex),
    /// Current brightness.
    Brightness(u8),
    /// Acknowledges a stored brightness.
    BrightnessStored(u8),
    /// Proximity ADC sample.
    Adc(AdcReading),
    /// The device refused the command.
    Rejected { opcode: u8, reason: RejectReason },
}

fn finish(opcode: Opcode, payload: &[u8]) -> Frame {
    // Every layout above is far below MAX_PAYLOAD_SIZE
    debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
    let mut bytes = [0u8; MAX_PACKET_SIZE];
    bytes[0] = opcode.into();
    bytes[1..=payload.len()].copy_from_slice(payload);
    Frame::from_bytes(bytes)
}

fn put_expression(buf: &mut BytesMut, expression: &Expression) {
    for row in expression.rows() {
        buf.put_u16_le(row);
    }
}

fn get_index(payload: &mut &[u8]) -> std::result::Result<ExpressionIndex, FrameError> {
    ExpressionIndex::try_from(payload.get_u8())
}

fn get_expression(payload: &mut &[u8]) -> std::result::Result<Expression, FrameError> {
    let mut rows = [0u16; MATRIX_HEIGHT as usize];
    for row in &mut rows {
        *row = payload.get_u16_le();
    }
    let expression = Expression::from_rows(rows);
    expression.validate()?;
    Ok(expression)
}

impl Request {
    /// Returns the opcode of this request.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Ping(_) => Opcode::Ping,
            Self::GetExpression(_) => Opcode::GetExpression,
            Self::SetExpression { .. } => Opcode::SetExpression,
            Self::GetBrightness => Opcode::GetBrightness,
            Self::SetBrightness(_) => Opcode::SetBrightness,
            Self::GetAdc => Opcode::GetAdc,
        }
    }

    /// Returns the opcode the device is expected to answer with.
    #[must_use]
    pub const fn expected_response(&self) -> Opcode {
        self.opcode().response()
    }

    /// Encodes the request into a frame.
    #[must_use]
    pub fn encode(&self) -> Frame {
        let mut buf = BytesMut::with_capacity(MAX_PAYLOAD_SIZE);
        match self {
            Self::Ping(nonce) => buf.put_u32_le(*nonce),
            Self::GetExpression(index) => buf.put_u8((*index).into()),
            Self::SetExpression { index, expression } => {
                buf.put_u8((*index).into());
                put_expression(&mut buf, expression);
            }
            Self::GetBrightness | Self::GetAdc => {}
            Self::SetBrightness(value) => buf.put_u8(*value),
        }
        finish(self.opcode(), &buf)
    }

    /// Decodes a request frame, as the device does.
    pub fn decode(frame: &Frame) -> std::result::Result<Self, FrameError> {
        let mut payload = frame.payload();
        let opcode = Opcode::from_byte(frame.opcode())
            .filter(|op| op.is_command())
            .ok_or(FrameError::UnknownOpcode(frame.opcode()))?;

        let request = match opcode {
            Opcode::Ping => Self::Ping(payload.get_u32_le()),
            Opcode::GetExpression => Self::GetExpression(get_index(&mut payload)?),
            Opcode::SetExpression => {
                let index = get_index(&mut payload)?;
                let expression = get_expression(&mut payload)?;
                Self::SetExpression { index, expression }
            }
            Opcode::GetBrightness => Self::GetBrightness,
            Opcode::SetBrightness => Self::SetBrightness(payload.get_u8()),
            Opcode::GetAdc => Self::GetAdc,
            other => return Err(FrameError::UnknownOpcode(other.into())),
        };
        Ok(request)
    }
}

impl Response {
    /// Returns the opcode of this response.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Pong(_) => Opcode::Ping,
            Self::Expression { .. } => Opcode::GetExpression,
            Self::ExpressionStored(_) => Opcode::SetExpressionAck,
            Self::Brightness(_) => Opcode::GetBrightness,
            Self::BrightnessStored(_) => Opcode::SetBrightnessAck,
            Self::Adc(_) => Opcode::GetAdc,
            Self::Rejected { .. } => Opcode::Reject,
        }
    }

    /// Builds the rejection of a request.
    #[must_use]
    pub const fn reject(request: Opcode, reason: RejectReason) -> Self {
        Self::Rejected {
            opcode: request as u8,
            reason,
        }
    }

    /// Encodes the response into a frame, as the device does.
    #[must_use]
    pub fn encode(&self) -> Frame {
        let mut buf = BytesMut::with_capacity(MAX_PAYLOAD_SIZE);
        match self {
            Self::Pong(nonce) => buf.put_u32_le(*nonce),
            Self::Expression { index, expression } => {
                buf.put_u8((*index).into());
                put_expression(&mut buf, expression);
            }
            Self::ExpressionStored(index) => buf.put_u8((*index).into()),
            Self::Brightness(value) | Self::BrightnessStored(value) => buf.put_u8(*value),
            Self::Adc(reading) => buf.put_u16_le(reading.raw()),
            Self::Rejected { opcode, reason } => {
                buf.put_u8(*opcode);
                buf.put_u8(reason.to_byte());
            }
        }
        finish(self.opcode(), &buf)
    }

    /// Decodes a response frame, checking it answers the expected opcode.
    ///
    /// A [`Opcode::Reject`] frame is accepted for any expected opcode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedResponse`] on an opcode mismatch, or
    /// [`Error::Frame`] if the payload is malformed.
    pub fn decode(frame: &Frame, expected: Opcode) -> Result<Self> {
        let actual = frame.opcode();
        if actual != u8::from(expected) && actual != u8::from(Opcode::Reject) {
            return Err(Error::UnexpectedResponse {
                expected: expected.into(),
                actual,
            });
        }
        Ok(Self::parse(frame)?)
    }

    /// Decodes any response frame without an opcode expectation.
    pub fn parse(frame: &Frame) -> std::result::Result<Self, FrameError> {
        let mut payload = frame.payload();
        let opcode =
            Opcode::from_byte(frame.opcode()).ok_or(FrameError::UnknownOpcode(frame.opcode()))?;

        let response = match opcode {
            Opcode::Ping => Self::Pong(payload.get_u32_le()),
            Opcode::GetExpression => {
                let index = get_index(&mut payload)?;
                let expression = get_expression(&mut payload)?;
                Self::Expression { index, expression }
            }
            Opcode::SetExpressionAck => Self::ExpressionStored(get_index(&mut payload)?),
            Opcode::GetBrightness => Self::Brightness(payload.get_u8()),
            Opcode::SetBrightnessAck => Self::BrightnessStored(payload.get_u8()),
            Opcode::GetAdc => Self::Adc(AdcReading(payload.get_u16_le())),
            Opcode::Reject => {
                let opcode = payload.get_u8();
                let reason = RejectReason::from_byte(payload.get_u8());
                Self::Rejected { opcode, reason }
            }
            Opcode::SetExpression | Opcode::SetBrightness => {
                return Err(FrameError::UnknownOpcode(opcode.into()));
            }
        };
        Ok(response)
    }
}
