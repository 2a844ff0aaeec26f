//! Plain-text rendering of engine payloads.

use vellum_protocol::{Item, LocationRef, Room, RoomDescription};

/// Replace `{room|id}` and `{item|id}` tokens in the description prose
/// with the referenced names. Tokens that resolve to nothing are left
/// as written, so a bad reference stays visible instead of vanishing.
pub fn resolve_description(desc: &RoomDescription) -> String {
    let mut out = String::with_capacity(desc.text.len());
    let mut rest = desc.text.as_str();
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        match lookup(desc, &tail[1..end]) {
            Some(name) => out.push_str(name),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(desc: &'a RoomDescription, token: &str) -> Option<&'a str> {
    let (kind, id) = token.split_once('|')?;
    match kind {
        "room" => desc.rooms.get(id).map(|room| room.name.as_str()),
        "item" => desc.items.get(id).map(|item| item.name.as_str()),
        _ => None,
    }
}

pub fn room_block(room: &Room) -> String {
    let mut out = format!("\n== {} ==\n{}\n", room.name, resolve_description(&room.description));
    if let Some(message) = room.message.as_deref().filter(|m| !m.is_empty()) {
        out.push_str(message);
        out.push('\n');
    }
    out
}

pub fn item_line(item: &Item) -> String {
    match item.description.as_deref() {
        Some(desc) if !desc.is_empty() => format!("  {} — {desc}", item.name),
        _ => format!("  {}", item.name),
    }
}

pub fn location_line(location: &LocationRef) -> String {
    format!("  {}", location.name)
}
