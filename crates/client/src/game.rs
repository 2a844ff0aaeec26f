//! Typed game API on top of the correlation layer.
//!
//! One method per engine action, each deserializing the reply payload
//! into the protocol's model types. A `forbidden` reply is a normal
//! outcome here (the player tried something the story disallows), not an
//! error.

use {
    serde::de::DeserializeOwned,
    serde_json::{Value, json},
    tokio::sync::mpsc,
};

use vellum_protocol::{
    Intro, Item, LocationRef, Refusal, Room, RoomDescription, ServerInfo, Status, UseOutcome,
    actions,
};

use crate::{
    connection::{ConnectOptions, Connection, ConnectionEvent},
    error::{Error, Result},
};

/// Result of an action the engine may refuse.
#[derive(Debug)]
pub enum Outcome<T> {
    Accepted(T),
    /// The engine answered `forbidden`; the message is for the player.
    Refused(String),
}

/// A connected, handshaken game session.
pub struct GameClient {
    conn: Connection,
}

impl GameClient {
    /// Connect and handshake; see [`Connection::connect`].
    pub async fn connect(
        options: ConnectOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        let (conn, events) = Connection::connect(options).await?;
        Ok((Self { conn }, events))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Engine metadata from the handshake.
    pub fn server(&self) -> Option<&ServerInfo> {
        self.conn.server()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Opening screen, or `None` when the story has no intro.
    pub async fn intro(&self) -> Result<Option<Intro>> {
        match self.conn.send_action(actions::GET_INTRO, None).await? {
            (Status::Ok, data) => Ok(Some(serde_json::from_value(data)?)),
            (Status::Missing, _) => Ok(None),
            (status, _) => Err(unexpected(actions::GET_INTRO, status)),
        }
    }

    pub async fn inventory(&self) -> Result<Vec<Item>> {
        let data: vellum_protocol::InventoryData =
            self.expect_ok(actions::GET_INVENTORY, None).await?;
        Ok(data.inventory)
    }

    pub async fn current_room(&self) -> Result<Room> {
        self.expect_ok(actions::GET_ROOM, None).await
    }

    pub async fn room_description(&self) -> Result<RoomDescription> {
        self.expect_ok(actions::GET_ROOM_DESCRIPTION, None).await
    }

    /// Look an item up by id; `None` when the engine does not know it.
    pub async fn item(&self, id: &str) -> Result<Option<Item>> {
        let sent = self
            .conn
            .send_action(actions::GET_ITEM, Some(json!({"id": id})))
            .await?;
        match sent {
            (Status::Ok, data) => {
                let data: vellum_protocol::ItemData = serde_json::from_value(data)?;
                Ok(Some(data.item))
            },
            (Status::Missing, _) => Ok(None),
            (status, _) => Err(unexpected(actions::GET_ITEM, status)),
        }
    }

    /// Rooms reachable from the current one.
    pub async fn locations(&self) -> Result<Vec<LocationRef>> {
        let data: vellum_protocol::LocationsData =
            self.expect_ok(actions::GET_LOCATIONS, None).await?;
        Ok(data.locations)
    }

    /// Walk to another room. Refused when the way is blocked.
    pub async fn enter_room(&self, room_id: &str) -> Result<Outcome<Room>> {
        self.allow_refusal(actions::ENTER_ROOM, Some(json!({"room": room_id})))
            .await
    }

    /// Use an item from the inventory.
    pub async fn use_item(&self, item_id: &str) -> Result<Outcome<UseOutcome>> {
        self.allow_refusal(actions::USE_ITEM, Some(json!({"item": item_id})))
            .await
    }

    /// Interact with something referenced inline in the room description.
    pub async fn use_description_item(&self, item_id: &str) -> Result<Outcome<UseOutcome>> {
        self.allow_refusal(actions::USE_DESCRIPTION_ITEM, Some(json!({"item": item_id})))
            .await
    }

    /// Combine two inventory items; accepted replies carry the result item.
    pub async fn combine(&self, first: &str, second: &str) -> Result<Outcome<Item>> {
        self.allow_refusal(actions::COMBINE_ITEMS, Some(json!({"items": [first, second]})))
            .await
    }

    async fn expect_ok<T: DeserializeOwned>(&self, action: &str, data: Option<Value>) -> Result<T> {
        match self.conn.send_action(action, data).await? {
            (Status::Ok, data) => Ok(serde_json::from_value(data)?),
            (status, _) => Err(unexpected(action, status)),
        }
    }

    async fn allow_refusal<T: DeserializeOwned>(
        &self,
        action: &str,
        data: Option<Value>,
    ) -> Result<Outcome<T>> {
        match self.conn.send_action(action, data).await? {
            (Status::Ok, data) => Ok(Outcome::Accepted(serde_json::from_value(data)?)),
            (Status::Forbidden, data) => {
                let refusal: Refusal = serde_json::from_value(data).unwrap_or_default();
                Ok(Outcome::Refused(refusal.message))
            },
            (status, _) => Err(unexpected(action, status)),
        }
    }
}

fn unexpected(action: &str, status: Status) -> Error {
    Error::UnexpectedStatus {
        action: action.to_string(),
        status,
    }
}
