//! WebSocket transport built on `tokio-tungstenite`.
//!
//! # Event Loop
//!
//! Each [`WsConnector::connect`] call spawns a tokio task that:
//!
//! - Performs the client handshake (with `Sec-WebSocket-Protocol` if set)
//! - Forwards inbound text frames to [`TransportEvents::received`]
//! - Writes outbound frames queued through [`WsHandle::send`]
//! - Reports `opened` / `errored` / `closed` as the socket changes state

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::handle::{
    ConnectRequest, Connector, ReadyState, SharedReadyState, TransportEvents, TransportHandle,
};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the requested sub-protocol.
const PROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

// ============================================================================
// SessionCommand
// ============================================================================

/// Internal commands for the event loop.
enum SessionCommand {
    /// Write a text frame.
    Frame(String),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// WsConnector
// ============================================================================

/// Connector producing `ws://` / `wss://` transports.
///
/// Requires a running tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a new connector.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds the handshake request for `request`.
    fn client_request(request: &ConnectRequest) -> Result<Request> {
        let url = Url::parse(&request.address)
            .map_err(|e| Error::config(format!("invalid address {:?}: {e}", request.address)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "unsupported scheme {:?}, expected ws or wss",
                url.scheme()
            )));
        }

        let mut client_request = url.as_str().into_client_request()?;

        if let Some(protocol) = request.protocol.as_deref() {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| Error::config(format!("invalid protocol {protocol:?}: {e}")))?;
            client_request.headers_mut().insert(PROTOCOL_HEADER, value);
        }

        Ok(client_request)
    }

    /// Drives one socket from handshake to close.
    async fn run_session(
        client_request: Request,
        state: SharedReadyState,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        events: TransportEvents,
    ) {
        let ws_stream = match connect_async(client_request).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                debug!(error = %e, "WebSocket handshake failed");
                state.set(ReadyState::Closed);
                events.errored(Error::WebSocket(e));
                events.closed();
                return;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Closed while the handshake was in flight
        if !state.try_open() {
            debug!("Close requested during handshake");
            let _ = ws_write.close().await;
            state.set(ReadyState::Closed);
            events.closed();
            return;
        }

        events.opened();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            events.received(text.as_str().to_owned());
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            events.errored(Error::WebSocket(e));
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SessionCommand::Frame(frame)) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                warn!(error = %e, "Failed to send frame");
                                events.errored(Error::WebSocket(e));
                            } else {
                                trace!("Frame sent");
                            }
                        }

                        Some(SessionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Handle dropped");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        state.set(ReadyState::Closed);
        events.closed();

        debug!("Event loop terminated");
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        request: &ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>> {
        let client_request = Self::client_request(request)?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::connection(format!("no tokio runtime available: {e}")))?;

        let state = SharedReadyState::new(ReadyState::Connecting);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        runtime.spawn(Self::run_session(
            client_request,
            state.clone(),
            command_rx,
            events,
        ));

        debug!(address = %request.address, "WebSocket connect started");

        Ok(Box::new(WsHandle { state, command_tx }))
    }
}

// ============================================================================
// WsHandle
// ============================================================================

/// Handle to a socket driven by [`WsConnector`].
pub struct WsHandle {
    /// Shared with the event loop.
    state: SharedReadyState,
    /// Channel to the event loop.
    command_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl TransportHandle for WsHandle {
    fn state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, frame: String) -> Result<()> {
        if self.state.get() != ReadyState::Open {
            return Err(Error::ConnectionClosed);
        }

        self.command_tx
            .send(SessionCommand::Frame(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        if self.state.begin_close() {
            let _ = self.command_tx.send(SessionCommand::Shutdown);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
