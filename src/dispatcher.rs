//! Request/response dispatching for `BlinkyBot` operations.
//!
//! The wire protocol carries no correlation id, so a connection may have at
//! most one request in flight. The [`Dispatcher`] enforces this with a small
//! state machine:
//!
//! ```text
//! Idle ──write──▶ Sent ──read──▶ AwaitingResponse ──decoded──▶ Idle
//!   any transport error, timeout or mismatched reply ──▶ Failed (absorbing)
//! ```
//!
//! Once `Failed`, every call returns [`Error::NotConnected`]; the connection
//! has to be torn down and reopened.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{Request, Response};
use crate::transport::Transport;
use crate::types::{AdcReading, Expression, ExpressionIndex};

/// Default time to wait for a response frame.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Ready for the next request.
    Idle,
    /// A request frame is being written.
    Sent,
    /// The request was written; waiting for its response frame.
    AwaitingResponse,
    /// The connection can no longer be trusted.
    Failed,
}

/// Serializes typed requests over a transport, one at a time.
#[derive(Debug)]
pub struct Dispatcher {
    state: DispatchState,
    timeout: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_TIMEOUT)
    }
}

impl Dispatcher {
    /// Creates an idle dispatcher.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            state: DispatchState::Idle,
            timeout,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> DispatchState {
        self.state
    }

    /// Returns true once the dispatcher has failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.state, DispatchState::Failed)
    }

    /// Returns the response timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn fail(&mut self, e: Error) -> Error {
        tracing::warn!("dispatcher failed: {}", e);
        self.state = DispatchState::Failed;
        e
    }

    /// Writes one request and reads its response.
    ///
    /// A [`Response::Rejected`] is returned as a value; the exchange itself
    /// completed and the dispatcher goes back to `Idle`.
    pub async fn transact<T>(&mut self, transport: &mut T, request: &Request) -> Result<Response>
    where
        T: Transport + ?Sized,
    {
        match self.state {
            DispatchState::Idle => {}
            DispatchState::Failed => return Err(Error::NotConnected),
            DispatchState::Sent | DispatchState::AwaitingResponse => {
                // A previous call was cancelled mid-exchange; its reply may
                // still be on the way.
                self.state = DispatchState::Failed;
                tracing::warn!("previous request abandoned in flight");
                return Err(Error::NotConnected);
            }
        }

        let frame = request.encode();
        tracing::debug!("-> {:?}", request);
        tracing::trace!("tx frame {}", frame.to_hex());

        self.state = DispatchState::Sent;
        if let Err(e) = transport.write(frame).await {
            return Err(self.fail(e));
        }

        self.state = DispatchState::AwaitingResponse;
        let reply = match transport.read(self.timeout).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::trace!("rx frame {}", reply.to_hex());

        let response = match Response::decode(&reply, request.expected_response()) {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e)),
        };

        self.state = DispatchState::Idle;
        tracing::debug!("<- {:?}", response);
        Ok(response)
    }

    fn mismatch(&mut self, request: &Request, response: &Response) -> Error {
        // Same opcode means the reply echoed the wrong nonce, index or value
        tracing::warn!("reply {:?} does not answer {:?}", response, request);
        self.fail(Error::UnexpectedResponse {
            expected: request.expected_response().into(),
            actual: response.opcode().into(),
        })
    }

    /// Sends a request and hands any non-rejected response to `extract`.
    async fn call<T, R>(
        &mut self,
        transport: &mut T,
        request: Request,
        extract: impl FnOnce(Response) -> Option<R>,
    ) -> Result<R>
    where
        T: Transport + ?Sized,
    {
        let response = self.transact(transport, &request).await?;
        if let Response::Rejected { opcode, reason } = response {
            return Err(Error::DeviceRejected { opcode, reason });
        }
        match extract(response) {
            Some(value) => Ok(value),
            None => Err(self.mismatch(&request, &response)),
        }
    }

    // ==================== Typed Operations ====================

    /// Sends a ping and checks the nonce comes back.
    pub async fn ping<T>(&mut self, transport: &mut T, nonce: u32) -> Result<u32>
    where
        T: Transport + ?Sized,
    {
        self.call(transport, Request::Ping(nonce), |response| match response {
            Response::Pong(echo) if echo == nonce => Some(echo),
            _ => None,
        })
        .await
    }

    /// Reads an expression slot.
    pub async fn get_expression<T>(
        &mut self,
        transport: &mut T,
        index: ExpressionIndex,
    ) -> Result<Expression>
    where
        T: Transport + ?Sized,
    {
        self.call(
            transport,
            Request::GetExpression(index),
            |response| match response {
                Response::Expression {
                    index: got,
                    expression,
                } if got == index => Some(expression),
                _ => None,
            },
        )
        .await
    }

    /// Writes an expression slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] without touching the transport if
    /// the expression has pixels beyond the matrix.
    pub async fn set_expression<T>(
        &mut self,
        transport: &mut T,
        index: ExpressionIndex,
        expression: Expression,
    ) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        expression
            .validate()
            .map_err(|e| Error::InvalidArgument {
                reason: e.to_string(),
            })?;

        self.call(
            transport,
            Request::SetExpression { index, expression },
            |response| match response {
                Response::ExpressionStored(got) if got == index => Some(()),
                _ => None,
            },
        )
        .await
    }

    /// Reads the LED brightness.
    pub async fn get_brightness<T>(&mut self, transport: &mut T) -> Result<u8>
    where
        T: Transport + ?Sized,
    {
        self.call(transport, Request::GetBrightness, |response| match response {
            Response::Brightness(value) => Some(value),
            _ => None,
        })
        .await
    }

    /// Writes the LED brightness.
    pub async fn set_brightness<T>(&mut self, transport: &mut T, value: u8) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        self.call(
            transport,
            Request::SetBrightness(value),
            |response| match response {
                Response::BrightnessStored(got) if got == value => Some(()),
                _ => None,
            },
        )
        .await
    }

    /// Reads the proximity ADC.
    pub async fn get_adc<T>(&mut self, transport: &mut T) -> Result<AdcReading>
    where
        T: Transport + ?Sized,
    {
        self.call(transport, Request::GetAdc, |response| match response {
            Response::Adc(reading) => Some(reading),
            _ => None,
        })
        .await
    }
}
