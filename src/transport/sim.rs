//! In-memory `BlinkyBot` simulation.
//!
//! [`SimulatedDevice`] answers frames the way the firmware does and keeps the
//! expression slots, brightness and ADC value in memory. Any number of
//! [`SimulatedTransport`]s can attach to one device; they compete for the
//! interface like separate host sessions would.
//!
//! The device can be told to misbehave (unplugged, silent, slow, rejecting)
//! and records every frame it receives and sends in a journal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::{Frame, Opcode, RejectReason, Request, Response};
use crate::transport::Transport;
use crate::types::{DEFAULT_BRIGHTNESS, Expression, ExpressionIndex};

/// A frame crossing the simulated wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEvent {
    /// The host wrote a frame with this opcode.
    Write { session: u64, opcode: u8 },
    /// The device replied with this opcode.
    Reply { session: u64, opcode: u8 },
}

#[derive(Debug)]
struct DeviceState {
    present: bool,
    claimed_by: Option<u64>,
    expressions: [Expression; 4],
    brightness: u8,
    adc: u16,
    silent: bool,
    reply_delay: Duration,
    reject_next: Option<RejectReason>,
    reply_next: Option<Frame>,
    opens: usize,
    claims: usize,
    next_session: u64,
    journal: Vec<WireEvent>,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            present: true,
            claimed_by: None,
            expressions: ExpressionIndex::ALL.map(ExpressionIndex::factory_expression),
            brightness: DEFAULT_BRIGHTNESS,
            adc: u16::MAX,
            silent: false,
            reply_delay: Duration::ZERO,
            reject_next: None,
            reply_next: None,
            opens: 0,
            claims: 0,
            next_session: 1,
            journal: Vec::new(),
        }
    }

    /// Runs one request through the firmware logic.
    fn handle(&mut self, frame: &Frame) -> Frame {
        if let Some(reply) = self.reply_next.take() {
            return reply;
        }

        let request = match Request::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("simulated device rejects frame: {}", e);
                let reason = match Opcode::from_byte(frame.opcode()) {
                    Some(op) if op.is_command() => RejectReason::InvalidArgument,
                    _ => RejectReason::Unsupported,
                };
                return Response::Rejected {
                    opcode: frame.opcode(),
                    reason,
                }
                .encode();
            }
        };

        if let Some(reason) = self.reject_next.take() {
            return Response::reject(request.opcode(), reason).encode();
        }

        let response = match request {
            Request::Ping(nonce) => Response::Pong(nonce),
            Request::GetExpression(index) => Response::Expression {
                index,
                expression: self.expressions[index as usize],
            },
            Request::SetExpression { index, expression } => {
                self.expressions[index as usize] = expression;
                Response::ExpressionStored(index)
            }
            Request::GetBrightness => Response::Brightness(self.brightness),
            Request::SetBrightness(value) => {
                self.brightness = value;
                Response::BrightnessStored(value)
            }
            Request::GetAdc => Response::Adc(self.adc.into()),
        };
        response.encode()
    }
}

/// A simulated `BlinkyBot` shared by its transports.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// Creates a plugged-in device with factory settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a new host session attached to this device.
    #[must_use]
    pub fn transport(&self) -> SimulatedTransport {
        let session = {
            let mut state = self.state();
            let session = state.next_session;
            state.next_session += 1;
            session
        };
        SimulatedTransport {
            device: self.clone(),
            session,
            open: false,
            replies: None,
        }
    }

    /// Removes the device; opens fail and open sessions stop working.
    pub fn unplug(&self) {
        let mut state = self.state();
        state.present = false;
        state.claimed_by = None;
    }

    /// Reattaches the device.
    pub fn plug_in(&self) {
        self.state().present = true;
    }

    /// When set, the device swallows requests without replying.
    pub fn set_silent(&self, silent: bool) {
        self.state().silent = silent;
    }

    /// Delays every reply by `delay`.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.state().reply_delay = delay;
    }

    /// Rejects the next request with `reason`.
    pub fn reject_next(&self, reason: RejectReason) {
        self.state().reject_next = Some(reason);
    }

    /// Answers the next request with `frame` instead of the real reply.
    pub fn reply_next_with(&self, frame: Frame) {
        self.state().reply_next = Some(frame);
    }

    /// Sets the value the proximity ADC reports.
    pub fn set_adc(&self, raw: u16) {
        self.state().adc = raw;
    }

    /// Returns the stored brightness.
    #[must_use]
    pub fn brightness(&self) -> u8 {
        self.state().brightness
    }

    /// Returns the stored expression of a slot.
    #[must_use]
    pub fn expression(&self, index: ExpressionIndex) -> Expression {
        self.state().expressions[index as usize]
    }

    /// Returns how many times the device was opened.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.state().opens
    }

    /// Returns how many times the interface was claimed.
    #[must_use]
    pub fn claims(&self) -> usize {
        self.state().claims
    }

    /// Returns true if some session holds the interface.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.state().claimed_by.is_some()
    }

    /// Returns every frame seen on the wire so far.
    #[must_use]
    pub fn journal(&self) -> Vec<WireEvent> {
        self.state().journal.clone()
    }
}

/// A host session on a [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimulatedTransport {
    device: SimulatedDevice,
    session: u64,
    open: bool,
    replies: Option<(mpsc::UnboundedSender<Frame>, mpsc::UnboundedReceiver<Frame>)>,
}

impl SimulatedTransport {
    /// Returns the session id used in [`WireEvent`]s.
    #[must_use]
    pub const fn session(&self) -> u64 {
        self.session
    }

    /// Returns the device this transport is attached to.
    #[must_use]
    pub const fn device(&self) -> &SimulatedDevice {
        &self.device
    }
}

impl Transport for SimulatedTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.open {
                return Ok(());
            }

            let mut state = self.device.state();
            if !state.present {
                return Err(Error::DeviceUnavailable {
                    reason: "simulated device unplugged".into(),
                });
            }
            state.opens += 1;
            drop(state);

            self.replies = Some(mpsc::unbounded_channel());
            self.open = true;
            tracing::debug!("simulated session {} opened", self.session);
            Ok(())
        })
    }

    fn claim(&mut self, interface: u8) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.open {
                return Err(Error::TransportClosed);
            }

            let mut state = self.device.state();
            match state.claimed_by {
                Some(owner) if owner == self.session => Ok(()),
                Some(_) => Err(Error::InterfaceBusy { interface }),
                None => {
                    state.claimed_by = Some(self.session);
                    state.claims += 1;
                    Ok(())
                }
            }
        })
    }

    fn write(&mut self, frame: Frame) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.open {
                return Err(Error::TransportClosed);
            }
            let Some((tx, _)) = self.replies.as_ref() else {
                return Err(Error::TransportClosed);
            };
            let tx = tx.clone();
            let session = self.session;

            let mut state = self.device.state();
            if !state.present {
                return Err(Error::TransportClosed);
            }
            state.journal.push(WireEvent::Write {
                session,
                opcode: frame.opcode(),
            });

            let reply = state.handle(&frame);
            if state.silent {
                return Ok(());
            }

            let delay = state.reply_delay;
            if delay.is_zero() {
                state.journal.push(WireEvent::Reply {
                    session,
                    opcode: reply.opcode(),
                });
                // Receiver gone means the session closed meanwhile
                let _ = tx.send(reply);
            } else {
                drop(state);
                let device = self.device.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    device.state().journal.push(WireEvent::Reply {
                        session,
                        opcode: reply.opcode(),
                    });
                    let _ = tx.send(reply);
                });
            }
            Ok(())
        })
    }

    fn read(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Frame>> {
        Box::pin(async move {
            if !self.open {
                return Err(Error::TransportClosed);
            }
            let Some((_, rx)) = self.replies.as_mut() else {
                return Err(Error::TransportClosed);
            };

            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(frame)) => Ok(frame),
                Ok(None) => Err(Error::TransportClosed),
                Err(_) => Err(Error::timeout(timeout)),
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.open {
                return Ok(());
            }

            let mut state = self.device.state();
            if state.claimed_by == Some(self.session) {
                state.claimed_by = None;
            }
            drop(state);

            self.replies = None;
            self.open = false;
            tracing::debug!("simulated session {} closed", self.session);
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_unplugged_device() {
        let device = SimulatedDevice::new();
        device.unplug();
        let mut transport = device.transport();

        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable { .. }));
        assert_eq!(device.opens(), 0);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let device = SimulatedDevice::new();
        let mut first = device.transport();
        let mut second = device.transport();

        first.open().await.unwrap();
        first.claim(1).await.unwrap();
        second.open().await.unwrap();

        let err = second.claim(1).await.unwrap_err();
        assert!(matches!(err, Error::InterfaceBusy { interface: 1 }));

        first.close().await.unwrap();
        second.claim(1).await.unwrap();
        assert_eq!(device.claims(), 2);
    }

    #[tokio::test]
    async fn test_write_after_close() {
        let device = SimulatedDevice::new();
        let mut transport = device.transport();
        transport.open().await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport
            .write(Request::GetBrightness.encode())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransportClosed));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_request_reply() {
        let device = SimulatedDevice::new();
        let mut transport = device.transport();
        transport.open().await.unwrap();

        transport.write(Request::Ping(42).encode()).await.unwrap();
        let reply = transport.read(Duration::from_millis(100)).await.unwrap();

        assert_eq!(Response::parse(&reply).unwrap(), Response::Pong(42));
        assert_eq!(
            device.journal(),
            vec![
                WireEvent::Write {
                    session: transport.session(),
                    opcode: 0x01
                },
                WireEvent::Reply {
                    session: transport.session(),
                    opcode: 0x01
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let device = SimulatedDevice::new();
        device.set_silent(true);
        let mut transport = device.transport();
        transport.open().await.unwrap();

        transport.write(Request::GetAdc.encode()).await.unwrap();
        let err = transport.read(Duration::from_millis(500)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 500 }));
    }

    #[tokio::test]
    async fn test_unknown_opcode_rejected() {
        let device = SimulatedDevice::new();
        let mut transport = device.transport();
        transport.open().await.unwrap();

        transport.write(Frame::new(0x42, &[]).unwrap()).await.unwrap();
        let reply = transport.read(Duration::from_millis(100)).await.unwrap();

        assert_eq!(
            Response::parse(&reply).unwrap(),
            Response::Rejected {
                opcode: 0x42,
                reason: RejectReason::Unsupported
            }
        );
    }

    #[tokio::test]
    async fn test_stores_settings() {
        let device = SimulatedDevice::new();
        let mut transport = device.transport();
        transport.open().await.unwrap();

        transport
            .write(Request::SetBrightness(99).encode())
            .await
            .unwrap();
        let reply = transport.read(Duration::from_millis(100)).await.unwrap();

        assert_eq!(Response::parse(&reply).unwrap(), Response::BrightnessStored(99));
        assert_eq!(device.brightness(), 99);
    }
}
