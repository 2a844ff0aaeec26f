//! Connection management: socket ownership, read/write loops, session
//! phases, and the handshake.
//!
//! A [`Connection`] wraps one WebSocket session. Outbound frames flow
//! through a bounded channel into a dedicated write loop; a read loop
//! feeds every inbound text frame to the router. Transport-level trouble
//! is reported on a [`ConnectionEvent`] channel, separate from the
//! per-request error paths.

use std::{sync::Arc, time::Duration};

use {
    futures::{
        SinkExt, StreamExt,
        stream::{SplitSink, SplitStream},
    },
    serde_json::Value,
    tokio::{
        net::TcpStream,
        sync::{mpsc, watch},
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message},
    tracing::{debug, info, warn},
};

use vellum_protocol::{HandshakeParams, ServerInfo, events};

use crate::{
    error::{Error, Result},
    router::{PendingReply, RequestRouter, Response},
};

/// Stream type returned by `tokio_tungstenite::connect_async`.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound frames buffered between a send call and the write loop.
const OUTBOUND_BUFFER: usize = 32;

// ── Session phases ───────────────────────────────────────────────────────────

/// Lifecycle of a session. Actions are only meaningful in `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Handshaking,
    Ready,
    Closed,
}

/// Connection-level notifications, distinct from per-request results.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// An inbound frame could not be decoded; no pending request was
    /// touched since correlation is impossible.
    ProtocolError(String),
    /// The transport dropped. Every request still pending at that moment
    /// has been aborted.
    Closed { pending_aborted: usize },
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// `ws://` or `wss://` endpoint of the engine.
    pub url: String,
    /// Client version reported in the handshake.
    pub ui_version: String,
    /// When set, a request with no reply within the limit resolves with
    /// [`Error::Timeout`] and is forgotten. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Reject actions issued before the handshake reply arrives. When
    /// off, actions are transmitted immediately and the engine decides.
    pub strict_handshake: bool,
}

impl ConnectOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ui_version: env!("CARGO_PKG_VERSION").into(),
            request_timeout: None,
            strict_handshake: true,
        }
    }
}

// ── Connection ───────────────────────────────────────────────────────────────

/// One live session with the engine.
///
/// Dropping a `Connection` does not tear the session down by itself (the
/// spawned loops hold the socket); call [`close`](Self::close), or let the
/// engine side close.
pub struct Connection {
    router: Arc<RequestRouter>,
    phase: Arc<watch::Sender<Phase>>,
    options: ConnectOptions,
    server: Option<ServerInfo>,
}

impl Connection {
    /// Establish the socket, spawn the I/O loops, and perform the
    /// handshake. Returns once the session is `Ready`, together with the
    /// receiving end of the connection-event channel.
    pub async fn connect(
        options: ConnectOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        let phase = Arc::new(watch::channel(Phase::Connecting).0);
        let (ws, _) = tokio_tungstenite::connect_async(&options.url).await?;
        let (sink, stream) = ws.split();

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let router = Arc::new(RequestRouter::new(out_tx));

        tokio::spawn(write_loop(sink, out_rx));
        tokio::spawn(read_loop(
            stream,
            Arc::clone(&router),
            event_tx,
            Arc::clone(&phase),
        ));

        phase.send_replace(Phase::Handshaking);
        let mut conn = Self::from_parts(router, phase, options);
        let server = conn.handshake().await?;
        info!(engine = %server.engine_version, "session ready");
        conn.server = Some(server);
        conn.phase.send_replace(Phase::Ready);
        Ok((conn, event_rx))
    }

    fn from_parts(
        router: Arc<RequestRouter>,
        phase: Arc<watch::Sender<Phase>>,
        options: ConnectOptions,
    ) -> Self {
        Self {
            router,
            phase,
            options,
            server: None,
        }
    }

    /// Current session phase.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Engine metadata recorded from the handshake reply.
    pub fn server(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// Requests still waiting for their reply.
    pub async fn pending_requests(&self) -> usize {
        self.router.pending_len().await
    }

    /// Send an action and await its response.
    ///
    /// With `strict_handshake`, actions issued before `Ready` are rejected
    /// with [`Error::NotReady`].
    pub async fn send_action(&self, name: &str, data: Option<Value>) -> Result<Response> {
        match self.phase() {
            Phase::Ready => {},
            Phase::Closed => return Err(Error::ConnectionClosed),
            Phase::Connecting | Phase::Handshaking if self.options.strict_handshake => {
                return Err(Error::NotReady);
            },
            Phase::Connecting | Phase::Handshaking => {},
        }
        let reply = self.router.send_action(name, data).await?;
        self.await_reply(reply).await
    }

    /// Send a session-lifecycle event and await its response. Events are
    /// exempt from the `Ready` gate; the handshake itself is one.
    pub async fn send_event(&self, name: &str, data: Option<Value>) -> Result<Response> {
        if self.phase() == Phase::Closed {
            return Err(Error::ConnectionClosed);
        }
        let reply = self.router.send_event(name, data).await?;
        self.await_reply(reply).await
    }

    /// Close the session: stop accepting sends and abort every pending
    /// request. The write loop shuts the socket down once drained.
    pub async fn close(&self) {
        self.phase.send_replace(Phase::Closed);
        let aborted = self.router.close().await;
        if aborted > 0 {
            debug!(aborted, "closed with requests still pending");
        }
    }

    async fn handshake(&self) -> Result<ServerInfo> {
        let params = HandshakeParams {
            ui_version: self.options.ui_version.clone(),
        };
        let (status, data) = self
            .send_event(events::HANDSHAKE, Some(serde_json::to_value(&params)?))
            .await?;
        if !status.is_ok() {
            return Err(Error::Handshake(status));
        }
        Ok(serde_json::from_value(data)?)
    }

    async fn await_reply(&self, reply: PendingReply) -> Result<Response> {
        match self.options.request_timeout {
            Some(limit) => {
                let req_id = reply.req_id();
                match tokio::time::timeout(limit, reply).await {
                    Ok(res) => res,
                    Err(_) => {
                        self.router.forget(req_id).await;
                        Err(Error::Timeout(limit))
                    },
                }
            },
            None => reply.await,
        }
    }
}

// ── I/O loops ────────────────────────────────────────────────────────────────

async fn write_loop(mut sink: SplitSink<WsStream, Message>, mut frames: mpsc::Receiver<String>) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = sink.send(Message::Text(frame.into())).await {
            warn!(%err, "write failed, dropping connection");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    router: Arc<RequestRouter>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    phase: Arc<watch::Sender<Phase>>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(raw)) => {
                if let Err(err) = router.dispatch(raw.as_str()).await {
                    warn!(%err, "undecodable frame");
                    let _ = events.send(ConnectionEvent::ProtocolError(err.to_string()));
                }
            },
            Ok(Message::Close(_)) => break,
            // The protocol is text-only; control frames are handled by the
            // library and anything else is ignored.
            Ok(_) => {},
            Err(err) => {
                warn!(%err, "transport error");
                break;
            },
        }
    }
    phase.send_replace(Phase::Closed);
    let aborted = router.close().await;
    debug!(aborted, "connection closed");
    let _ = events.send(ConnectionEvent::Closed {
        pending_aborted: aborted,
    });
}
