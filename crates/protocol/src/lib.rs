//! Wire protocol for the Vellum adventure-engine client.
//!
//! All communication is JSON, one document per WebSocket text frame.
//!
//! Frame types:
//! - [`Envelope`] — client → engine request, tagged `action` or `event`,
//!   carrying a connection-unique `req_id`
//! - [`ResponseEnvelope`] — engine → client reply, echoing the `req_id`
//!   of the request it answers
//!
//! The engine never initiates a request of its own; every inbound frame
//! answers exactly one outbound envelope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Action and event names ───────────────────────────────────────────────────

/// Namespaced action names understood by the engine.
///
/// Queries live under `game/get/`, movement under `room/`, item
/// manipulation under `item/`. The strings are a contract with the engine;
/// renaming one here is a protocol change.
pub mod actions {
    pub const GET_INVENTORY: &str = "game/get/inventory";
    pub const GET_INTRO: &str = "game/get/intro";
    pub const GET_ROOM: &str = "game/get/room";
    pub const GET_ITEM: &str = "game/get/item";
    pub const GET_LOCATIONS: &str = "game/get/locations";
    pub const GET_ROOM_DESCRIPTION: &str = "game/get/room-description";
    pub const ENTER_ROOM: &str = "room/enter";
    pub const USE_DESCRIPTION_ITEM: &str = "room/use-item";
    pub const USE_ITEM: &str = "item/use";
    pub const COMBINE_ITEMS: &str = "item/combine";
}

/// Session-lifecycle event names.
pub mod events {
    pub const HANDSHAKE: &str = "handshake";
}

// ── Status tags ──────────────────────────────────────────────────────────────

/// Outcome tag carried by every [`ResponseEnvelope`].
///
/// The known tags form the engine's current vocabulary; anything else is
/// preserved verbatim in [`Status::Other`] so a newer engine does not
/// break an older client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Missing,
    Forbidden,
    Error,
    #[serde(untagged)]
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "ok",
            Self::Missing => "missing",
            Self::Forbidden => "forbidden",
            Self::Error => "error",
            Self::Other(tag) => tag,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client → engine request frame.
///
/// Serializes as `{"type":"action","action":...,"data":...,"req_id":...}`
/// or `{"type":"event","event":...,"data":...,"req_id":...}`. Actions
/// query or mutate game state; events signal session lifecycle (the
/// handshake). Both are correlated the same way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Action {
        action: String,
        data: serde_json::Value,
        req_id: u64,
    },
    Event {
        event: String,
        data: serde_json::Value,
        req_id: u64,
    },
}

impl Envelope {
    pub fn action(name: impl Into<String>, data: serde_json::Value, req_id: u64) -> Self {
        Self::Action {
            action: name.into(),
            data,
            req_id,
        }
    }

    pub fn event(name: impl Into<String>, data: serde_json::Value, req_id: u64) -> Self {
        Self::Event {
            event: name.into(),
            data,
            req_id,
        }
    }

    pub fn req_id(&self) -> u64 {
        match self {
            Self::Action { req_id, .. } | Self::Event { req_id, .. } => *req_id,
        }
    }

    /// The action or event name, whichever this envelope carries.
    pub fn name(&self) -> &str {
        match self {
            Self::Action { action, .. } => action,
            Self::Event { event, .. } => event,
        }
    }
}

/// Engine → client reply frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub req_id: u64,
    pub status: Status,
    #[serde(default)]
    pub data: serde_json::Value,
}

// ── Handshake ────────────────────────────────────────────────────────────────

/// Payload of the `handshake` event, the first frame on every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "uiVersion")]
    pub ui_version: String,
}

/// Engine metadata returned by the handshake reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "engineVersion")]
    pub engine_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ── Game model ───────────────────────────────────────────────────────────────

/// A room as the engine describes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub description: RoomDescription,
    /// One-shot message shown when the room is presented.
    #[serde(rename = "msg", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

/// Room prose plus lookup maps for the `{room|id}` / `{item|id}` tokens
/// embedded in the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDescription {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub rooms: HashMap<String, LocationRef>,
    #[serde(default)]
    pub items: HashMap<String, Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Name/id pair for a room reachable from the current one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: String,
    pub name: String,
}

/// Opening screen of a story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intro {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

/// Follow-up the engine instructs the client to perform after an action
/// reply, e.g. add a picked-up item to the inventory display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUp {
    AddToInventory,
    MoveTo,
    Nothing,
}

// ── Reply payloads ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryData {
    pub inventory: Vec<Item>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationsData {
    pub locations: Vec<LocationRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    pub item: Item,
}

/// Reply to `item/use` and `room/use-item`: a player-facing message,
/// optionally accompanied by a follow-up order and its object id.
#[derive(Debug, Clone, Deserialize)]
pub struct UseOutcome {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub action: Option<FollowUp>,
    #[serde(default)]
    pub object: Option<String>,
}

/// Payload of a `forbidden` reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Refusal {
    #[serde(default)]
    pub message: String,
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// A frame that cannot participate in correlation.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ── Envelope wire shape ────────────────────────────────────────────

    #[test]
    fn action_envelope_wire_shape() {
        let env = Envelope::action(actions::ENTER_ROOM, serde_json::json!({"room": "r2"}), 7);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "action");
        assert_eq!(json["action"], "room/enter");
        assert_eq!(json["data"]["room"], "r2");
        assert_eq!(json["req_id"], 7);
        assert!(!json.as_object().unwrap().contains_key("event"));
    }

    #[test]
    fn event_envelope_wire_shape() {
        let env = Envelope::event(
            events::HANDSHAKE,
            serde_json::json!({"uiVersion": "0.1.0"}),
            1,
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"], "handshake");
        assert_eq!(json["req_id"], 1);
        assert!(!json.as_object().unwrap().contains_key("action"));
    }

    #[test]
    fn envelope_round_trip() {
        let json = r#"{"type":"action","action":"game/get/room","data":{},"req_id":3}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.name(), "game/get/room");
        assert_eq!(env.req_id(), 3);
    }

    // ── Response envelope ──────────────────────────────────────────────

    #[test]
    fn response_envelope_parses() {
        let json = r#"{"req_id":7,"status":"forbidden","data":{"message":"locked"}}"#;
        let resp: ResponseEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(resp.req_id, 7);
        assert_eq!(resp.status, Status::Forbidden);
        assert_eq!(resp.data["message"], "locked");
    }

    #[test]
    fn response_envelope_null_data() {
        let json = r#"{"req_id":2,"status":"missing","data":null}"#;
        let resp: ResponseEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, Status::Missing);
        assert!(resp.data.is_null());
    }

    #[test]
    fn response_envelope_absent_data() {
        let json = r#"{"req_id":2,"status":"ok"}"#;
        let resp: ResponseEnvelope = serde_json::from_str(json).unwrap();
        assert!(resp.data.is_null());
    }

    // ── Status tags ────────────────────────────────────────────────────

    #[test]
    fn known_statuses_parse() {
        for (raw, expected) in [
            ("\"ok\"", Status::Ok),
            ("\"missing\"", Status::Missing),
            ("\"forbidden\"", Status::Forbidden),
            ("\"error\"", Status::Error),
        ] {
            let status: Status = serde_json::from_str(raw).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn unknown_status_preserved_verbatim() {
        let status: Status = serde_json::from_str("\"rate-limited\"").unwrap();
        assert_eq!(status, Status::Other("rate-limited".into()));
        assert_eq!(status.as_str(), "rate-limited");
        let back = serde_json::to_string(&status).unwrap();
        assert_eq!(back, "\"rate-limited\"");
    }

    // ── Handshake ──────────────────────────────────────────────────────

    #[test]
    fn handshake_params_use_camel_case() {
        let params = HandshakeParams {
            ui_version: "0.1.0".into(),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["uiVersion"], "0.1.0");
    }

    #[test]
    fn server_info_parses_partial_metadata() {
        let json = r#"{"engineVersion":"0.1.1","name":"The Hollow Keep"}"#;
        let info: ServerInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.engine_version, "0.1.1");
        assert_eq!(info.name.as_deref(), Some("The Hollow Keep"));
        assert!(info.author.is_none());
    }

    // ── Game model ─────────────────────────────────────────────────────

    #[test]
    fn room_parses_with_description_lookups() {
        let json = serde_json::json!({
            "id": "r1",
            "name": "Cellar",
            "msg": "You smell damp stone.",
            "image": null,
            "sound": null,
            "description": {
                "id": "d1",
                "text": "A ladder leads up to the {room|r2}. A {item|i1} lies here.",
                "rooms": {"r2": {"id": "r2", "name": "Kitchen"}},
                "items": {"i1": {"id": "i1", "name": "rusty key"}}
            }
        });
        let room: Room = serde_json::from_value(json).unwrap();
        assert_eq!(room.description.rooms["r2"].name, "Kitchen");
        assert_eq!(room.description.items["i1"].name, "rusty key");
        assert_eq!(room.message.as_deref(), Some("You smell damp stone."));
    }

    #[test]
    fn use_outcome_with_follow_up() {
        let json = serde_json::json!({
            "message": "You pocket the key.",
            "action": "add_to_inventory",
            "object": "i1"
        });
        let outcome: UseOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(outcome.action, Some(FollowUp::AddToInventory));
        assert_eq!(outcome.object.as_deref(), Some("i1"));
    }

    #[test]
    fn use_outcome_without_follow_up() {
        let json = serde_json::json!({"message": "Nothing happens."});
        let outcome: UseOutcome = serde_json::from_value(json).unwrap();
        assert!(outcome.action.is_none());
        assert!(outcome.object.is_none());
    }

    #[test]
    fn malformed_frame_error_displays_cause() {
        let err = serde_json::from_str::<ResponseEnvelope>("not-json").unwrap_err();
        let err = ProtocolError::MalformedFrame(err);
        assert!(err.to_string().starts_with("malformed frame"));
    }
}
