//! USB transport implementation.
//!
//! This module talks to `BlinkyBot` devices through libusb bulk endpoints.
//! libusb calls block, so each one runs on tokio's blocking pool.

use std::io;
use std::time::Duration;

use futures::future::BoxFuture;
use rusb::{Context, DeviceHandle, UsbContext};

use crate::error::{Error, Result};
use crate::protocol::{Frame, MAX_PACKET_SIZE};
use crate::transport::Transport;

/// USB vendor id of `BlinkyBot` devices.
pub const DEFAULT_VENDOR_ID: u16 = 0xf569;

/// USB product id of `BlinkyBot` devices.
pub const DEFAULT_PRODUCT_ID: u16 = 0x0001;

/// Interface carrying the command endpoints.
pub const DEFAULT_INTERFACE: u8 = 1;

/// Bulk IN endpoint address.
pub const DEFAULT_ENDPOINT_IN: u8 = 0x81;

/// Bulk OUT endpoint address.
pub const DEFAULT_ENDPOINT_OUT: u8 = 0x01;

/// Default timeout for bulk OUT transfers.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Shortest timeout handed to a bulk transfer.
const MIN_TRANSFER_TIMEOUT: Duration = Duration::from_millis(1);

/// Configuration for USB transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbConfig {
    /// Vendor id to match during discovery.
    pub vendor_id: u16,
    /// Product id to match, or `None` to accept any product of the vendor.
    pub product_id: Option<u16>,
    /// Interface to claim.
    pub interface: u8,
    /// Bulk IN endpoint address.
    pub endpoint_in: u8,
    /// Bulk OUT endpoint address.
    pub endpoint_out: u8,
    /// Timeout for bulk OUT transfers.
    pub write_timeout: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbConfig {
    /// Creates a configuration matching the stock `BlinkyBot` firmware.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: Some(DEFAULT_PRODUCT_ID),
            interface: DEFAULT_INTERFACE,
            endpoint_in: DEFAULT_ENDPOINT_IN,
            endpoint_out: DEFAULT_ENDPOINT_OUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Sets the vendor id.
    #[must_use]
    pub const fn vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    /// Sets the product id filter.
    #[must_use]
    pub const fn product_id(mut self, product_id: Option<u16>) -> Self {
        self.product_id = product_id;
        self
    }

    /// Sets the interface number.
    #[must_use]
    pub const fn interface(mut self, interface: u8) -> Self {
        self.interface = interface;
        self
    }

    /// Sets the bulk endpoint addresses.
    #[must_use]
    pub const fn endpoints(mut self, endpoint_in: u8, endpoint_out: u8) -> Self {
        self.endpoint_in = endpoint_in;
        self.endpoint_out = endpoint_out;
        self
    }

    /// Sets the bulk OUT timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        vendor_id == self.vendor_id && self.product_id.is_none_or(|pid| pid == product_id)
    }
}

/// A USB device found during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceSummary {
    /// Bus number.
    pub bus: u8,
    /// Address on the bus.
    pub address: u8,
    /// Vendor id.
    pub vendor_id: u16,
    /// Product id.
    pub product_id: u16,
}

/// USB transport for `BlinkyBot` communication.
pub struct UsbTransport {
    config: UsbConfig,
    handle: Option<DeviceHandle<Context>>,
    claimed: Option<u8>,
}

impl UsbTransport {
    /// Creates a new USB transport with the given configuration.
    #[must_use]
    pub const fn new(config: UsbConfig) -> Self {
        Self {
            config,
            handle: None,
            claimed: None,
        }
    }

    /// Returns the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &UsbConfig {
        &self.config
    }

    /// Runs a blocking libusb call against the open handle.
    ///
    /// The handle is moved onto the blocking pool and put back afterwards.
    async fn with_handle<R, F>(&mut self, f: F) -> Result<rusb::Result<R>>
    where
        F: FnOnce(&mut DeviceHandle<Context>) -> rusb::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut handle = self.handle.take().ok_or(Error::TransportClosed)?;
        let (handle, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut handle);
            (handle, result)
        })
        .await
        .map_err(|e| {
            // The handle is lost with the task
            self.claimed = None;
            Error::Io(io::Error::other(e))
        })?;
        self.handle = Some(handle);
        Ok(result)
    }
}

fn open_matching(config: &UsbConfig) -> Result<DeviceHandle<Context>> {
    let context = Context::new()?;
    let devices = context.devices()?;

    for device in devices.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        if !config.matches(desc.vendor_id(), desc.product_id()) {
            continue;
        }

        tracing::debug!(
            "opening device bus={} addr={} vid={:#06x} pid={:#06x}",
            device.bus_number(),
            device.address(),
            desc.vendor_id(),
            desc.product_id()
        );
        return device.open().map_err(|e| match e {
            rusb::Error::Access | rusb::Error::NoDevice | rusb::Error::NotFound => {
                Error::DeviceUnavailable {
                    reason: e.to_string(),
                }
            }
            other => Error::Usb(other),
        });
    }

    Err(Error::DeviceUnavailable {
        reason: format!("no device with vendor id {:#06x}", config.vendor_id),
    })
}

fn map_claim_error(e: rusb::Error, interface: u8) -> Error {
    match e {
        rusb::Error::Busy => Error::InterfaceBusy { interface },
        rusb::Error::Access | rusb::Error::NoDevice => Error::DeviceUnavailable {
            reason: e.to_string(),
        },
        other => Error::Usb(other),
    }
}

fn map_io_error(e: rusb::Error, timeout: Duration) -> Error {
    match e {
        rusb::Error::Timeout => Error::timeout(timeout),
        rusb::Error::NoDevice => Error::TransportClosed,
        other => Error::Usb(other),
    }
}

/// libusb waits forever on a zero timeout.
fn transfer_timeout(timeout: Duration) -> Duration {
    timeout.max(MIN_TRANSFER_TIMEOUT)
}

impl Transport for UsbTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.handle.is_some() {
                return Ok(());
            }

            tracing::info!("opening USB device {:04x}", self.config.vendor_id);
            let config = self.config.clone();
            let mut handle = tokio::task::spawn_blocking(move || open_matching(&config))
                .await
                .map_err(|e| Error::Io(io::Error::other(e)))??;

            // Not every platform can detach kernel drivers
            if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
                tracing::debug!("auto-detach of kernel driver unavailable: {}", e);
            }

            self.handle = Some(handle);
            tracing::info!("USB device opened");
            Ok(())
        })
    }

    fn claim(&mut self, interface: u8) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.handle.is_none() {
                return Err(Error::TransportClosed);
            }
            if self.claimed == Some(interface) {
                return Ok(());
            }

            self.with_handle(move |handle| handle.claim_interface(interface))
                .await?
                .map_err(|e| map_claim_error(e, interface))?;

            tracing::debug!("claimed interface {}", interface);
            self.claimed = Some(interface);
            Ok(())
        })
    }

    fn write(&mut self, frame: Frame) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let endpoint = self.config.endpoint_out;
            let timeout = transfer_timeout(self.config.write_timeout);
            tracing::trace!("usb out: {}", frame.to_hex());

            let written = self
                .with_handle(move |handle| handle.write_bulk(endpoint, frame.as_bytes(), timeout))
                .await?
                .map_err(|e| map_io_error(e, timeout))?;

            if written != MAX_PACKET_SIZE {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {written} of {MAX_PACKET_SIZE} bytes"),
                )));
            }
            Ok(())
        })
    }

    fn read(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Frame>> {
        Box::pin(async move {
            let endpoint = self.config.endpoint_in;
            let timeout = transfer_timeout(timeout);

            let packet = self
                .with_handle(move |handle| {
                    let mut buf = [0u8; MAX_PACKET_SIZE];
                    let n = handle.read_bulk(endpoint, &mut buf, timeout)?;
                    Ok((buf, n))
                })
                .await?
                .map_err(|e| map_io_error(e, timeout))?;

            let (buf, n) = packet;
            let frame = Frame::from_packet(&buf[..n])?;
            tracing::trace!("usb in: {}", frame.to_hex());
            Ok(frame)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            // A handle lost with a cancelled call takes its claim with it
            let claimed = self.claimed.take();
            if self.handle.is_none() {
                return Ok(());
            }

            if let Some(interface) = claimed {
                let released = self
                    .with_handle(move |handle| handle.release_interface(interface))
                    .await;
                match released {
                    Ok(Ok(())) => tracing::debug!("released interface {}", interface),
                    Ok(Err(e)) => tracing::warn!("failed to release interface {}: {}", interface, e),
                    Err(e) => tracing::warn!("failed to release interface {}: {}", interface, e),
                }
            }

            tracing::info!("closing USB device");
            self.handle = None;
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

/// Lists attached USB devices with the given vendor id.
///
/// # Errors
///
/// Returns an error if the device list cannot be retrieved.
pub fn list_devices(vendor_id: u16) -> Result<Vec<UsbDeviceSummary>> {
    let context = Context::new()?;
    let devices = context.devices()?;

    Ok(devices
        .iter()
        .filter_map(|device| {
            let desc = device.device_descriptor().ok()?;
            (desc.vendor_id() == vendor_id).then(|| UsbDeviceSummary {
                bus: device.bus_number(),
                address: device.address(),
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_config_defaults() {
        let config = UsbConfig::default();
        assert_eq!(config.vendor_id, 0xf569);
        assert_eq!(config.product_id, Some(0x0001));
        assert_eq!(config.interface, 1);
        assert_eq!(config.endpoint_in, 0x81);
        assert_eq!(config.endpoint_out, 0x01);
    }

    #[test]
    fn test_usb_config_builder() {
        let config = UsbConfig::new()
            .vendor_id(0x1209)
            .product_id(None)
            .interface(0)
            .endpoints(0x82, 0x02)
            .write_timeout(Duration::from_millis(250));
        assert_eq!(config.vendor_id, 0x1209);
        assert_eq!(config.interface, 0);
        assert_eq!(config.endpoint_in, 0x82);
        assert_eq!(config.endpoint_out, 0x02);
        assert_eq!(config.write_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_usb_config_matching() {
        let exact = UsbConfig::new();
        assert!(exact.matches(0xf569, 0x0001));
        assert!(!exact.matches(0xf569, 0x0002));
        assert!(!exact.matches(0x1234, 0x0001));

        let any_product = UsbConfig::new().product_id(None);
        assert!(any_product.matches(0xf569, 0x0002));
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let mut transport = UsbTransport::new(UsbConfig::new());
        assert!(!transport.is_open());

        let err = transport.write(Frame::new(0x01, &[]).unwrap()).await;
        assert!(matches!(err, Err(Error::TransportClosed)));

        let err = transport.read(Duration::from_millis(10)).await;
        assert!(matches!(err, Err(Error::TransportClosed)));

        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_drops_stale_claim() {
        let mut transport = UsbTransport::new(UsbConfig::new());
        transport.claimed = Some(1);

        transport.close().await.unwrap();
        assert_eq!(transport.claimed, None);

        let err = transport.claim(1).await;
        assert!(matches!(err, Err(Error::TransportClosed)));
    }

    #[test]
    fn test_claim_error_mapping() {
        assert!(matches!(
            map_claim_error(rusb::Error::Busy, 1),
            Error::InterfaceBusy { interface: 1 }
        ));
        assert!(matches!(
            map_claim_error(rusb::Error::Access, 1),
            Error::DeviceUnavailable { .. }
        ));
        assert!(matches!(
            map_claim_error(rusb::Error::NoDevice, 1),
            Error::DeviceUnavailable { .. }
        ));
        assert!(matches!(
            map_claim_error(rusb::Error::NotSupported, 1),
            Error::Usb(rusb::Error::NotSupported)
        ));
    }

    #[test]
    fn test_io_error_mapping() {
        let timeout = Duration::from_millis(250);
        assert!(matches!(
            map_io_error(rusb::Error::Timeout, timeout),
            Error::Timeout { timeout_ms: 250 }
        ));
        assert!(matches!(
            map_io_error(rusb::Error::NoDevice, timeout),
            Error::TransportClosed
        ));
        assert!(matches!(
            map_io_error(rusb::Error::Pipe, timeout),
            Error::Usb(rusb::Error::Pipe)
        ));
        assert!(matches!(
            map_io_error(rusb::Error::Overflow, timeout),
            Error::Usb(rusb::Error::Overflow)
        ));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        assert_eq!(transfer_timeout(Duration::ZERO), Duration::from_millis(1));
        assert_eq!(
            transfer_timeout(Duration::from_millis(300)),
            Duration::from_millis(300)
        );
    }

    #[test]
    #[ignore = "Requires libusb and access to /dev/bus/usb - not available in sandboxed builds"]
    fn test_list_devices() {
        // Just verify it doesn't panic
        let _ = list_devices(DEFAULT_VENDOR_ID);
    }
}
