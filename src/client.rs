//! Main [`BlinkyBot`] client implementation.
//!
//! This module provides the high-level [`BlinkyBot`] client that owns the
//! transport and the per-connection dispatcher and exposes the typed device
//! operations.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::dispatcher::{DEFAULT_RESPONSE_TIMEOUT, DispatchState, Dispatcher};
use crate::error::{Error, Result};
use crate::transport::{Transport, UsbConfig, UsbTransport};
use crate::types::{AdcReading, Expression, ExpressionIndex};

/// An open session with the device.
#[derive(Debug)]
struct Connection {
    interface: u8,
    dispatcher: Dispatcher,
}

struct Session<T> {
    transport: T,
    connection: Option<Connection>,
}

impl<T: Transport> Session<T> {
    /// Borrows the transport and dispatcher of a live connection.
    fn live(&mut self) -> Result<(&mut T, &mut Dispatcher)> {
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
        Ok((&mut self.transport, &mut connection.dispatcher))
    }

    /// Tears the connection down if the last operation poisoned it.
    async fn settle<R>(&mut self, result: Result<R>) -> Result<R> {
        let failed = self
            .connection
            .as_ref()
            .is_some_and(|connection| connection.dispatcher.is_failed());
        if failed {
            tracing::warn!("connection failed, closing transport");
            self.connection = None;
            if let Err(e) = self.transport.close().await {
                tracing::warn!("failed to close transport: {}", e);
            }
        }
        result
    }
}

/// Client for communicating with a `BlinkyBot` device.
///
/// All operations take `&self`; concurrent calls are queued and run one at a
/// time, so the client can be shared behind an `Arc`.
pub struct BlinkyBot<T> {
    session: Mutex<Session<T>>,
    interface: u8,
    response_timeout: Duration,
}

impl BlinkyBot<UsbTransport> {
    /// Creates a new client for the first attached `BlinkyBot`.
    ///
    /// # Returns
    ///
    /// A new client (not yet connected).
    #[must_use]
    pub fn usb() -> Self {
        Self::with_usb_config(UsbConfig::new())
    }

    /// Creates a new client with custom USB configuration.
    #[must_use]
    pub fn with_usb_config(config: UsbConfig) -> Self {
        let interface = config.interface;
        Self::with_transport(UsbTransport::new(config)).with_interface(interface)
    }
}

impl<T: Transport> BlinkyBot<T> {
    /// Creates a new client with the given transport.
    #[must_use]
    pub fn with_transport(transport: T) -> Self {
        Self {
            session: Mutex::new(Session {
                transport,
                connection: None,
            }),
            interface: crate::transport::usb::DEFAULT_INTERFACE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Sets the interface claimed on connect.
    #[must_use]
    pub const fn with_interface(mut self, interface: u8) -> Self {
        self.interface = interface;
        self
    }

    /// Sets how long each request waits for its response.
    #[must_use]
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Returns the response timeout.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    async fn session(&self) -> MutexGuard<'_, Session<T>> {
        self.session.lock().await
    }

    /// Opens the device and claims the command interface.
    ///
    /// Returns immediately if already connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened or the interface is
    /// held by another session.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session().await;
        if session.connection.is_some() {
            tracing::debug!("already connected");
            return Ok(());
        }

        tracing::info!("connecting to device");
        session.transport.open().await?;
        if let Err(e) = session.transport.claim(self.interface).await {
            if let Err(close_err) = session.transport.close().await {
                tracing::warn!("failed to close transport: {}", close_err);
            }
            return Err(e);
        }

        session.connection = Some(Connection {
            interface: self.interface,
            dispatcher: Dispatcher::new(self.response_timeout),
        });
        tracing::info!("connected, interface {} claimed", self.interface);
        Ok(())
    }

    /// Closes the connection.
    ///
    /// Waits for an in-flight request to finish first. Returns immediately
    /// if not connected.
    pub async fn disconnect(&self) -> Result<()> {
        let mut session = self.session().await;
        let Some(connection) = session.connection.take() else {
            return Ok(());
        };

        tracing::info!("disconnecting, releasing interface {}", connection.interface);
        session.transport.close().await
    }

    /// Returns true if connected and ready for the next request.
    ///
    /// A connection left mid-exchange by a cancelled call counts as lost.
    pub async fn is_connected(&self) -> bool {
        self.session()
            .await
            .connection
            .as_ref()
            .is_some_and(|connection| connection.dispatcher.state() == DispatchState::Idle)
    }

    /// Returns the claimed interface, if connected.
    pub async fn interface(&self) -> Option<u8> {
        self.session()
            .await
            .connection
            .as_ref()
            .map(|connection| connection.interface)
    }

    // ==================== Device Methods ====================

    /// Sends a ping; the device echoes `nonce`.
    pub async fn ping(&self, nonce: u32) -> Result<u32> {
        let mut session = self.session().await;
        let result = match session.live() {
            Ok((transport, dispatcher)) => dispatcher.ping(transport, nonce).await,
            Err(e) => Err(e),
        };
        session.settle(result).await
    }

    /// Reads an expression slot.
    pub async fn get_expression(&self, index: ExpressionIndex) -> Result<Expression> {
        let mut session = self.session().await;
        let result = match session.live() {
            Ok((transport, dispatcher)) => dispatcher.get_expression(transport, index).await,
            Err(e) => Err(e),
        };
        session.settle(result).await
    }

    /// Writes an expression slot.
    pub async fn set_expression(&self, index: ExpressionIndex, expression: Expression) -> Result<()> {
        let mut session = self.session().await;
        let result = match session.live() {
            Ok((transport, dispatcher)) => {
                dispatcher
                    .set_expression(transport, index, expression)
                    .await
            }
            Err(e) => Err(e),
        };
        session.settle(result).await
    }

    /// Reads the LED brightness.
    pub async fn get_brightness(&self) -> Result<u8> {
        let mut session = self.session().await;
        let result = match session.live() {
            Ok((transport, dispatcher)) => dispatcher.get_brightness(transport).await,
            Err(e) => Err(e),
        };
        session.settle(result).await
    }

    /// Writes the LED brightness.
    pub async fn set_brightness(&self, value: u8) -> Result<()> {
        let mut session = self.session().await;
        let result = match session.live() {
            Ok((transport, dispatcher)) => dispatcher.set_brightness(transport, value).await,
            Err(e) => Err(e),
        };
        session.settle(result).await
    }

    /// Reads the proximity ADC.
    pub async fn get_adc(&self) -> Result<AdcReading> {
        let mut session = self.session().await;
        let result = match session.live() {
            Ok((transport, dispatcher)) => dispatcher.get_adc(transport).await,
            Err(e) => Err(e),
        };
        session.settle(result).await
    }

    // ==================== Convenience Methods ====================

    /// Returns true if the proximity sensor currently sees a friend.
    pub async fn sees_friend(&self) -> Result<bool> {
        Ok(self.get_adc().await?.sees_friend())
    }

    /// Restores the factory expression of a slot.
    pub async fn reset_expression(&self, index: ExpressionIndex) -> Result<()> {
        self.set_expression(index, index.factory_expression()).await
    }
}
