//! Client for the Vellum adventure engine.
//!
//! One persistent WebSocket connection; every outbound envelope carries a
//! connection-unique `req_id`, and the matching inbound reply resolves
//! the sender's future exactly once, independent of arrival order.
//!
//! Layers:
//! - [`RequestRouter`] — id assignment, pending table, dispatch
//! - [`Connection`] — socket ownership, I/O loops, handshake, phases
//! - [`GameClient`] — typed game actions

pub mod connection;
pub mod error;
pub mod game;
pub mod router;

pub use {
    connection::{ConnectOptions, Connection, ConnectionEvent, Phase},
    error::{Error, Result},
    game::{GameClient, Outcome},
    router::{PendingReply, RequestRouter, Response},
};
