//! Transport layer for `BlinkyBot` communication.
//!
//! This module provides the abstraction over the packet connection to the
//! device. [`UsbTransport`] talks to real hardware; [`SimulatedTransport`]
//! talks to an in-memory device.

pub mod sim;
pub mod usb;

use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::protocol::Frame;

/// Trait for transport implementations.
///
/// Every transfer is exactly one [`Frame`].
pub trait Transport: Send {
    /// Opens the device.
    ///
    /// Fails with `DeviceUnavailable` if no matching device is present or
    /// access is denied.
    fn open(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Claims an interface for exclusive use.
    ///
    /// Fails with `InterfaceBusy` if another session holds it.
    fn claim(&mut self, interface: u8) -> BoxFuture<'_, Result<()>>;

    /// Writes one frame to the device.
    ///
    /// Fails with `TransportClosed` after [`Transport::close`].
    fn write(&mut self, frame: Frame) -> BoxFuture<'_, Result<()>>;

    /// Waits up to `timeout` for the next frame from the device.
    fn read(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Frame>>;

    /// Releases the interface and closes the device. Idempotent.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Returns true if the device is open.
    fn is_open(&self) -> bool;
}

pub use sim::{SimulatedDevice, SimulatedTransport, WireEvent};
pub use usb::{UsbConfig, UsbDeviceSummary, UsbTransport, list_devices};
