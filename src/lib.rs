//! # blinkybot
//!
//! A Rust client library for `BlinkyBot` LED-matrix devices.
//!
//! This library provides async request/response communication with a
//! `BlinkyBot` over USB: reading and storing its expressions, brightness and
//! proximity sensor.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Fixed-size framed protocol with typed requests and responses
//! - At most one request in flight; concurrent callers are queued
//! - Failed connections are torn down instead of returning stale data
//! - Simulated device for development without hardware
//!
//! ## Quick Start
//!
//! ```no_run
//! use blinkybot::{BlinkyBot, ExpressionIndex};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), blinkybot::Error> {
//!     // Connect to the first attached BlinkyBot
//!     let bot = BlinkyBot::usb();
//!     bot.connect().await?;
//!
//!     // Dim the display and show the resting face
//!     bot.set_brightness(0x10).await?;
//!     let face = bot.get_expression(ExpressionIndex::Default).await?;
//!     println!("{face}");
//!
//!     // Check the proximity sensor
//!     if bot.sees_friend().await? {
//!         println!("a friend is nearby");
//!     }
//!
//!     bot.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Frames, opcodes and typed request/response encoding
//! - [`types`] - Data structures (expressions, sensor readings)
//! - [`transport`] - Transport implementations (USB and simulated)
//! - [`dispatcher`] - Single-flight request/response state machine
//! - [`client`] - High-level [`BlinkyBot`] client

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::BlinkyBot;
pub use dispatcher::{DispatchState, Dispatcher};
pub use error::{Error, FrameError, Result};
pub use protocol::{Frame, Opcode, RejectReason, Request, Response};
pub use transport::{
    SimulatedDevice, SimulatedTransport, Transport, UsbConfig, UsbTransport, list_devices,
};
pub use types::{AdcReading, Expression, ExpressionIndex};
