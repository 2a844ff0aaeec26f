//! Request/response correlation over a single engine connection.
//!
//! The router owns the outbound half of the transport (a channel drained
//! by the connection's write loop), assigns strictly increasing request
//! ids, and keeps the table of requests still waiting for their reply.
//! One router per live connection; reconnecting means a fresh router and
//! with it a fresh id space.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use {
    serde_json::Value,
    tokio::sync::{Mutex, mpsc, oneshot},
    tracing::debug,
};

use vellum_protocol::{Envelope, ProtocolError, ResponseEnvelope, Status};

use crate::error::{Error, Result};

/// A resolved reply: the protocol status and its payload, verbatim.
pub type Response = (Status, Value);

struct RouterInner {
    next_req_id: u64,
    pending: HashMap<u64, oneshot::Sender<Response>>,
    /// `None` once the connection is closed; sends fail from then on.
    outbound: Option<mpsc::Sender<String>>,
}

/// Correlates outbound envelopes with inbound responses.
pub struct RequestRouter {
    inner: Mutex<RouterInner>,
}

impl RequestRouter {
    /// Build a router that hands serialized frames to `outbound`.
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self {
            inner: Mutex::new(RouterInner {
                next_req_id: 1,
                pending: HashMap::new(),
                outbound: Some(outbound),
            }),
        }
    }

    /// Send an `action` envelope. The returned [`PendingReply`] resolves
    /// exactly once with the matching response.
    ///
    /// `data` defaults to the empty object when absent.
    pub async fn send_action(&self, name: &str, data: Option<Value>) -> Result<PendingReply> {
        let data = data.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        self.send(|req_id| Envelope::action(name, data, req_id))
            .await
    }

    /// Send an `event` envelope. Same correlation contract as
    /// [`send_action`](Self::send_action); the protocol distinguishes the
    /// two only by name.
    pub async fn send_event(&self, name: &str, data: Option<Value>) -> Result<PendingReply> {
        let data = data.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        self.send(|req_id| Envelope::event(name, data, req_id))
            .await
    }

    async fn send(&self, build: impl FnOnce(u64) -> Envelope) -> Result<PendingReply> {
        let (tx, rx) = oneshot::channel();
        let (req_id, frame, outbound) = {
            let mut inner = self.inner.lock().await;
            let Some(outbound) = inner.outbound.clone() else {
                return Err(Error::ConnectionClosed);
            };
            let req_id = inner.next_req_id;
            inner.next_req_id += 1;
            let frame = serde_json::to_string(&build(req_id))?;
            // Register before handing the frame to the write loop so a
            // response can never arrive while no entry exists.
            inner.pending.insert(req_id, tx);
            (req_id, frame, outbound)
        };

        if outbound.send(frame).await.is_err() {
            // Write loop is gone; roll the registration back.
            self.inner.lock().await.pending.remove(&req_id);
            return Err(Error::ConnectionClosed);
        }
        Ok(PendingReply { req_id, rx })
    }

    /// Route one inbound text frame to the request that is waiting for it.
    ///
    /// A frame whose `req_id` is unknown (already answered, or issued on a
    /// superseded connection) is dropped. Arrival order carries no
    /// meaning; correlation is purely per id.
    pub async fn dispatch(&self, raw: &str) -> std::result::Result<(), ProtocolError> {
        let response: ResponseEnvelope =
            serde_json::from_str(raw).map_err(ProtocolError::MalformedFrame)?;
        let entry = self.inner.lock().await.pending.remove(&response.req_id);
        match entry {
            // The receiver may have been dropped (caller gave up or timed
            // out); that is not an error.
            Some(tx) => {
                let _ = tx.send((response.status, response.data));
            },
            None => debug!(req_id = response.req_id, "dropping reply to unknown request"),
        }
        Ok(())
    }

    /// Forget a pending request, e.g. after its caller timed out. A reply
    /// arriving later is then dropped like any other unknown id.
    pub async fn forget(&self, req_id: u64) -> bool {
        self.inner.lock().await.pending.remove(&req_id).is_some()
    }

    /// Tear down: stop accepting sends and abort every pending request.
    ///
    /// Dropping the pending senders resolves each outstanding
    /// [`PendingReply`] with [`Error::ConnectionClosed`]. Returns how many
    /// requests were still outstanding.
    pub async fn close(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.outbound = None;
        let aborted = inner.pending.len();
        inner.pending.clear();
        aborted
    }

    /// Number of requests still waiting for their reply.
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

/// The receiving half of an in-flight request.
///
/// Resolves exactly once: with the response's `(status, data)` when the
/// matching frame arrives, or with [`Error::ConnectionClosed`] when the
/// connection drops first.
pub struct PendingReply {
    req_id: u64,
    rx: oneshot::Receiver<Response>,
}

impl PendingReply {
    /// The request id assigned at send time.
    pub fn req_id(&self) -> u64 {
        self.req_id
    }
}

impl Future for PendingReply {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| Error::ConnectionClosed))
    }
}
