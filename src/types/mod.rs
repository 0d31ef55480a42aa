//! Data types for `BlinkyBot` entities.
//!
//! This module contains the value types exchanged with the device:
//! - Expressions and their slots
//! - Sensor readings and brightness defaults

pub mod expression;
pub mod sensor;

pub use expression::{Expression, ExpressionIndex, MATRIX_HEIGHT, MATRIX_WIDTH};
pub use sensor::{AdcReading, DEFAULT_BRIGHTNESS, FRIEND_THRESHOLD};
