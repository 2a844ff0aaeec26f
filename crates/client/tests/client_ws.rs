//! End-to-end tests against a scripted engine on a loopback socket.

use std::time::Duration;

use {
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::net::{TcpListener, TcpStream},
    tokio_tungstenite::{WebSocketStream, tungstenite::Message},
};

use vellum_client::{ConnectOptions, Connection, ConnectionEvent, Error, GameClient, Outcome, Phase};

type EngineWs = WebSocketStream<TcpStream>;

/// Bind a loopback engine, hand the accepted socket to `script`, and
/// return connect options pointing at it.
async fn spawn_engine<F, Fut>(script: F) -> ConnectOptions
where
    F: FnOnce(EngineWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        script(ws).await;
    });
    ConnectOptions::new(format!("ws://127.0.0.1:{}", addr.port()))
}

/// Next request frame, or `None` once the client is gone.
async fn recv_frame(ws: &mut EngineWs) -> Option<Value> {
    while let Some(frame) = ws.next().await {
        match frame.ok()? {
            Message::Text(raw) => return Some(serde_json::from_str(raw.as_str()).unwrap()),
            Message::Close(_) => return None,
            _ => {},
        }
    }
    None
}

async fn send_reply(ws: &mut EngineWs, req_id: u64, status: &str, data: Value) {
    let frame = json!({"req_id": req_id, "status": status, "data": data}).to_string();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

async fn answer_handshake(ws: &mut EngineWs) {
    let frame = recv_frame(ws).await.unwrap();
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["event"], "handshake");
    assert_eq!(frame["req_id"], 1);
    assert!(frame["data"]["uiVersion"].is_string());
    send_reply(
        ws,
        1,
        "ok",
        json!({
            "engineVersion": "0.1.1",
            "author": "defalt",
            "name": "The Hollow Keep",
            "description": "A damp little demo story."
        }),
    )
    .await;
}

fn room_json(id: &str, name: &str, text: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "msg": null,
        "image": null,
        "sound": null,
        "description": { "id": format!("d-{id}"), "text": text, "rooms": {}, "items": {} }
    })
}

#[tokio::test]
async fn handshake_makes_the_session_ready() {
    let options = spawn_engine(|mut ws| async move {
        answer_handshake(&mut ws).await;
        // Hold the socket open until the client hangs up.
        while recv_frame(&mut ws).await.is_some() {}
    })
    .await;

    let (conn, _events) = Connection::connect(options).await.unwrap();
    assert_eq!(conn.phase(), Phase::Ready);
    assert_eq!(conn.pending_requests().await, 0);

    let server = conn.server().unwrap();
    assert_eq!(server.engine_version, "0.1.1");
    assert_eq!(server.name.as_deref(), Some("The Hollow Keep"));
    assert_eq!(server.author.as_deref(), Some("defalt"));
    conn.close().await;
}

#[tokio::test]
async fn typed_actions_round_trip() {
    let options = spawn_engine(|mut ws| async move {
        answer_handshake(&mut ws).await;
        while let Some(frame) = recv_frame(&mut ws).await {
            let req_id = frame["req_id"].as_u64().unwrap();
            match frame["action"].as_str().unwrap() {
                "game/get/intro" => {
                    send_reply(
                        &mut ws,
                        req_id,
                        "ok",
                        json!({"title": "The Hollow Keep", "image": null}),
                    )
                    .await;
                },
                "game/get/room" => {
                    send_reply(
                        &mut ws,
                        req_id,
                        "ok",
                        room_json("r1", "Cellar", "Damp stone everywhere."),
                    )
                    .await;
                },
                "game/get/inventory" => {
                    send_reply(
                        &mut ws,
                        req_id,
                        "ok",
                        json!({"inventory": [{"id": "i1", "name": "rusty key"}]}),
                    )
                    .await;
                },
                "game/get/locations" => {
                    send_reply(
                        &mut ws,
                        req_id,
                        "ok",
                        json!({"locations": [{"id": "r2", "name": "Kitchen"}]}),
                    )
                    .await;
                },
                "room/enter" => {
                    assert_eq!(frame["data"]["room"], "r2");
                    send_reply(&mut ws, req_id, "forbidden", json!({"message": "locked"})).await;
                },
                "item/use" => {
                    assert_eq!(frame["data"]["item"], "i1");
                    send_reply(
                        &mut ws,
                        req_id,
                        "ok",
                        json!({"message": "It turns stiffly.", "action": "nothing", "object": null}),
                    )
                    .await;
                },
                "game/get/item" => {
                    send_reply(&mut ws, req_id, "missing", json!({})).await;
                },
                other => panic!("unexpected action {other}"),
            }
        }
    })
    .await;

    let (game, _events) = GameClient::connect(options).await.unwrap();

    let intro = game.intro().await.unwrap().unwrap();
    assert_eq!(intro.title.as_deref(), Some("The Hollow Keep"));

    let room = game.current_room().await.unwrap();
    assert_eq!(room.name, "Cellar");
    assert_eq!(room.description.text, "Damp stone everywhere.");

    let inventory = game.inventory().await.unwrap();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].name, "rusty key");

    let locations = game.locations().await.unwrap();
    assert_eq!(locations[0].id, "r2");

    match game.enter_room("r2").await.unwrap() {
        Outcome::Refused(message) => assert_eq!(message, "locked"),
        Outcome::Accepted(room) => panic!("entered {} through a locked door", room.name),
    }

    match game.use_item("i1").await.unwrap() {
        Outcome::Accepted(outcome) => {
            assert_eq!(outcome.message.as_deref(), Some("It turns stiffly."));
        },
        Outcome::Refused(message) => panic!("refused: {message}"),
    }

    assert!(game.item("i404").await.unwrap().is_none());
    game.close().await;
}

#[tokio::test]
async fn replies_out_of_order_resolve_their_own_requests() {
    let options = spawn_engine(|mut ws| async move {
        answer_handshake(&mut ws).await;
        let first = recv_frame(&mut ws).await.unwrap();
        let second = recv_frame(&mut ws).await.unwrap();
        assert!(first["req_id"].as_u64() < second["req_id"].as_u64());
        // Answer in reverse order of arrival.
        send_reply(
            &mut ws,
            second["req_id"].as_u64().unwrap(),
            "ok",
            json!({"locations": []}),
        )
        .await;
        send_reply(
            &mut ws,
            first["req_id"].as_u64().unwrap(),
            "ok",
            room_json("r1", "Cellar", "Quiet."),
        )
        .await;
        while recv_frame(&mut ws).await.is_some() {}
    })
    .await;

    let (game, _events) = GameClient::connect(options).await.unwrap();
    let (room, locations) = tokio::join!(game.current_room(), game.locations());
    assert_eq!(room.unwrap().name, "Cellar");
    assert!(locations.unwrap().is_empty());
    game.close().await;
}

#[tokio::test]
async fn stray_and_malformed_frames_leave_the_session_working() {
    let options = spawn_engine(|mut ws| async move {
        answer_handshake(&mut ws).await;
        // A reply nobody asked for, then a frame that is not JSON.
        send_reply(&mut ws, 99, "ok", json!({})).await;
        ws.send(Message::Text("{ not json".into())).await.unwrap();
        while let Some(frame) = recv_frame(&mut ws).await {
            let req_id = frame["req_id"].as_u64().unwrap();
            send_reply(&mut ws, req_id, "ok", json!({"inventory": []})).await;
        }
    })
    .await;

    let (game, mut events) = GameClient::connect(options).await.unwrap();

    match events.recv().await.unwrap() {
        ConnectionEvent::ProtocolError(message) => {
            assert!(message.contains("malformed frame"));
        },
        other => panic!("expected a protocol error event, got {other:?}"),
    }

    // Neither frame disturbed correlation.
    assert!(game.inventory().await.unwrap().is_empty());
    game.close().await;
}

#[tokio::test]
async fn engine_hangup_aborts_pending_requests() {
    let options = spawn_engine(|mut ws| async move {
        answer_handshake(&mut ws).await;
        // Read one action, then vanish without answering.
        recv_frame(&mut ws).await;
    })
    .await;

    let (conn, mut events) = Connection::connect(options).await.unwrap();
    let err = conn.send_action("game/get/room", None).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));

    match events.recv().await.unwrap() {
        ConnectionEvent::Closed { pending_aborted } => assert_eq!(pending_aborted, 1),
        other => panic!("expected a closed event, got {other:?}"),
    }
    assert_eq!(conn.phase(), Phase::Closed);
    assert!(matches!(
        conn.send_action("game/get/room", None).await,
        Err(Error::ConnectionClosed)
    ));
}

#[tokio::test]
async fn silent_engine_trips_the_request_timeout() {
    let mut options = spawn_engine(|mut ws| async move {
        answer_handshake(&mut ws).await;
        // Swallow everything; never reply again.
        while recv_frame(&mut ws).await.is_some() {}
    })
    .await;
    options.request_timeout = Some(Duration::from_millis(100));

    let (conn, _events) = Connection::connect(options).await.unwrap();
    let err = conn.send_action("game/get/room", None).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(conn.pending_requests().await, 0);
    conn.close().await;
}
