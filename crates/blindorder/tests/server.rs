//! End-to-end tests: a real server on loopback, driven by raw
//! `tokio-tungstenite` clients speaking the JSON wire contract.

use std::sync::Arc;
use std::time::Duration;

use blindorder::{BlindorderServerBuilder, RoomController};
use blindorder_store::{MemoryStore, RoomSettings};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port over a shared in-memory store.
async fn start_server() -> (String, RoomController<Arc<MemoryStore>>) {
    let store = Arc::new(MemoryStore::new());
    let server = BlindorderServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(Arc::clone(&store))
        .await
        .expect("server should build");

    let controller = server.controller();
    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, controller)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_msg(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

async fn recv_msg(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("recv failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("valid JSON");
        }
    }
}

/// Receives messages until one with the given type tag arrives.
async fn recv_of_type(ws: &mut ClientWs, wanted: &str) -> Value {
    loop {
        let msg = recv_msg(ws).await;
        if msg["type"] == wanted {
            return msg;
        }
    }
}

async fn create_room(controller: &RoomController<Arc<MemoryStore>>) -> String {
    controller
        .create_room(RoomSettings::default())
        .await
        .expect("room should be created")
        .to_string()
}

/// Sends a join and returns the first `room-updated` this client sees.
async fn join(
    ws: &mut ClientWs,
    code: &str,
    name: &str,
    is_host: bool,
) -> Value {
    send_msg(
        ws,
        json!({
            "type": "join-room",
            "roomId": code,
            "playerName": name,
            "isHost": is_host,
        }),
    )
    .await;
    recv_of_type(ws, "room-updated").await
}

/// `(username, hand)` for every participant in a room aggregate.
fn hands(room: &Value) -> Vec<(String, Vec<u8>)> {
    room["players"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            (
                p["username"].as_str().unwrap().to_string(),
                p["numbers"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|n| n.as_u64().unwrap() as u8)
                    .collect(),
            )
        })
        .collect()
}

/// Sets up a started two-player game; returns `(ws_ada, ws_bo, code,
/// playing_room)` where `playing_room` is ada's post-start aggregate.
async fn started_game(
    addr: &str,
    controller: &RoomController<Arc<MemoryStore>>,
) -> (ClientWs, ClientWs, String, Value) {
    let code = create_room(controller).await;

    let mut ws_ada = connect(addr).await;
    let mut ws_bo = connect(addr).await;
    join(&mut ws_ada, &code, "ada", true).await;
    join(&mut ws_bo, &code, "bo", false).await;
    // ada also sees bo's join.
    recv_of_type(&mut ws_ada, "room-updated").await;

    send_msg(&mut ws_ada, json!({"type": "start-game", "roomId": code})).await;
    let room = recv_of_type(&mut ws_ada, "room-updated").await;
    recv_of_type(&mut ws_ada, "game-state-updated").await;
    recv_of_type(&mut ws_bo, "room-updated").await;
    recv_of_type(&mut ws_bo, "game-state-updated").await;

    (ws_ada, ws_bo, code, room["data"].clone())
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_join_unknown_room_is_an_error() {
    let (addr, _controller) = start_server().await;
    let mut ws = connect(&addr).await;

    send_msg(
        &mut ws,
        json!({
            "type": "join-room",
            "roomId": "NOSUCH",
            "playerName": "ada",
        }),
    )
    .await;

    let msg = recv_msg(&mut ws).await;
    assert_eq!(msg["type"], "error");
    assert_eq!(msg["data"], "Room not found");
}

#[tokio::test]
async fn test_join_broadcasts_aggregate_with_host() {
    let (addr, controller) = start_server().await;
    let code = create_room(&controller).await;
    let mut ws = connect(&addr).await;

    let msg = join(&mut ws, &code, "ada", true).await;
    let room = &msg["data"];

    assert_eq!(room["id"], code.as_str());
    assert_eq!(room["state"], "lobby");
    let players = room["players"].as_array().unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["username"], "ada");
    assert_eq!(room["hostId"], players[0]["id"]);
}

#[tokio::test]
async fn test_join_with_invalid_username_is_rejected() {
    let (addr, controller) = start_server().await;
    let code = create_room(&controller).await;
    let mut ws = connect(&addr).await;

    send_msg(
        &mut ws,
        json!({
            "type": "join-room",
            "roomId": code,
            "playerName": "<script>",
        }),
    )
    .await;

    let msg = recv_msg(&mut ws).await;
    assert_eq!(msg["type"], "error");
    assert!(msg["data"]
        .as_str()
        .unwrap()
        .starts_with("Username can only contain"));
}

#[tokio::test]
async fn test_second_join_from_same_connection_is_rejected() {
    let (addr, controller) = start_server().await;
    let code = create_room(&controller).await;
    let mut ws = connect(&addr).await;
    join(&mut ws, &code, "ada", true).await;

    send_msg(
        &mut ws,
        json!({
            "type": "join-room",
            "roomId": code,
            "playerName": "ada2",
        }),
    )
    .await;

    let msg = recv_msg(&mut ws).await;
    assert_eq!(msg["type"], "error");
    assert_eq!(msg["data"], "Already in a room");
}

#[tokio::test]
async fn test_malformed_frame_gets_validation_error() {
    let (addr, _controller) = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text("not json at all".into()))
        .await
        .unwrap();

    let msg = recv_msg(&mut ws).await;
    assert_eq!(msg["type"], "error");
    assert!(msg["data"]
        .as_str()
        .unwrap()
        .starts_with("Invalid message"));
}

// =========================================================================
// Starting a game
// =========================================================================

#[tokio::test]
async fn test_start_game_broadcasts_hands_and_projection() {
    let (addr, controller) = start_server().await;
    let (_ws_ada, _ws_bo, _code, room) =
        started_game(&addr, &controller).await;

    assert_eq!(room["state"], "playing");
    assert_eq!(room["lives"], 3);
    for (_, hand) in hands(&room) {
        assert_eq!(hand.len(), 6);
    }
    // The audit trail starts with the game-started event.
    assert_eq!(room["gameEvents"][0]["type"], "game-started");

    // Hands are disjoint across participants.
    let all: Vec<u8> = hands(&room)
        .iter()
        .flat_map(|(_, h)| h.iter().copied())
        .collect();
    let mut deduped = all.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), all.len());
}

#[tokio::test]
async fn test_non_host_cannot_start() {
    let (addr, controller) = start_server().await;
    let code = create_room(&controller).await;

    let mut ws_ada = connect(&addr).await;
    let mut ws_bo = connect(&addr).await;
    join(&mut ws_ada, &code, "ada", true).await;
    join(&mut ws_bo, &code, "bo", false).await;

    send_msg(&mut ws_bo, json!({"type": "start-game", "roomId": code})).await;

    let msg = recv_msg(&mut ws_bo).await;
    assert_eq!(msg["type"], "error");
    assert_eq!(msg["data"], "Only the host can start the game");
}

#[tokio::test]
async fn test_start_with_one_player_fails_precondition() {
    let (addr, controller) = start_server().await;
    let code = create_room(&controller).await;
    let mut ws = connect(&addr).await;
    join(&mut ws, &code, "ada", true).await;

    send_msg(&mut ws, json!({"type": "start-game", "roomId": code})).await;

    let msg = recv_msg(&mut ws).await;
    assert_eq!(msg["type"], "error");
    assert_eq!(msg["data"], "Need at least 2 players to start");
}

// =========================================================================
// Playing numbers
// =========================================================================

#[tokio::test]
async fn test_incorrect_play_costs_a_life_everywhere() {
    let (addr, controller) = start_server().await;
    let (mut ws_ada, mut ws_bo, code, room) =
        started_game(&addr, &controller).await;

    let all_hands = hands(&room);
    let global_min = all_hands
        .iter()
        .flat_map(|(_, h)| h.iter().copied())
        .min()
        .unwrap();
    // Something from ada's hand that is NOT the global minimum.
    let ada_hand = &all_hands.iter().find(|(n, _)| n == "ada").unwrap().1;
    let wrong = *ada_hand.iter().find(|&&n| n != global_min).unwrap();

    send_msg(
        &mut ws_ada,
        json!({"type": "play-number", "roomId": code, "number": wrong}),
    )
    .await;

    for ws in [&mut ws_ada, &mut ws_bo] {
        let update = recv_of_type(ws, "room-updated").await;
        assert_eq!(update["data"]["lives"], 2);
        let events = update["data"]["gameEvents"].as_array().unwrap();
        let last = &events[events.len() - 1];
        assert_eq!(last["type"], "move-failed");
        assert_eq!(last["data"]["number"], wrong);
        assert_eq!(last["data"]["livesLost"], 1);

        let view = recv_of_type(ws, "game-state-updated").await;
        assert_eq!(view["data"]["lives"], 2);
    }
}

#[tokio::test]
async fn test_correct_play_extends_timeline_everywhere() {
    let (addr, controller) = start_server().await;
    let (mut ws_ada, mut ws_bo, code, room) =
        started_game(&addr, &controller).await;

    let all_hands = hands(&room);
    let global_min = all_hands
        .iter()
        .flat_map(|(_, h)| h.iter().copied())
        .min()
        .unwrap();
    let holder = &all_hands
        .iter()
        .find(|(_, h)| h.contains(&global_min))
        .unwrap()
        .0;
    let ws = if holder == "ada" {
        &mut ws_ada
    } else {
        &mut ws_bo
    };

    send_msg(
        ws,
        json!({"type": "play-number", "roomId": code, "number": global_min}),
    )
    .await;

    for ws in [&mut ws_ada, &mut ws_bo] {
        let update = recv_of_type(ws, "room-updated").await;
        assert_eq!(update["data"]["lives"], 3);
        assert_eq!(update["data"]["timeline"], json!([global_min]));
        let events = update["data"]["gameEvents"].as_array().unwrap();
        assert_eq!(events[events.len() - 1]["type"], "move-made");
    }
}

#[tokio::test]
async fn test_play_number_not_in_hand_is_an_error() {
    let (addr, controller) = start_server().await;
    let (mut ws_ada, _ws_bo, code, room) =
        started_game(&addr, &controller).await;

    let held: Vec<u8> = hands(&room)
        .iter()
        .flat_map(|(_, h)| h.iter().copied())
        .collect();
    let unheld = (1..=100).find(|n| !held.contains(n)).unwrap();

    send_msg(
        &mut ws_ada,
        json!({"type": "play-number", "roomId": code, "number": unheld}),
    )
    .await;

    let msg = recv_msg(&mut ws_ada).await;
    assert_eq!(msg["type"], "error");
    assert_eq!(
        msg["data"],
        format!("Number {unheld} is not in your hand")
    );
}

// =========================================================================
// Administration seam
// =========================================================================

#[tokio::test]
async fn test_controller_reads_and_updates_settings() {
    let (addr, controller) = start_server().await;
    let code_str = create_room(&controller).await;
    let code = blindorder_engine::RoomCode::new(code_str.clone());

    controller
        .update_settings(&code, Some(7), Some(4))
        .await
        .unwrap();
    let room = controller.room(&code).await.unwrap();
    assert_eq!(room.max_lives, 7);
    assert_eq!(room.numbers_per_player, 4);

    // Out-of-range values are rejected at the boundary.
    assert!(controller
        .update_settings(&code, Some(0), None)
        .await
        .is_err());

    // A joining client sees the updated settings.
    let mut ws = connect(&addr).await;
    let msg = join(&mut ws, &code_str, "ada", true).await;
    assert_eq!(msg["data"]["maxLives"], 7);
    assert_eq!(msg["data"]["numbersPerPlayer"], 4);
}

#[tokio::test]
async fn test_controller_delete_room_notifies_clients() {
    let (addr, controller) = start_server().await;
    let code_str = create_room(&controller).await;
    let code = blindorder_engine::RoomCode::new(code_str.clone());

    let mut ws = connect(&addr).await;
    join(&mut ws, &code_str, "ada", true).await;

    controller.delete_room(&code, "Room closed").await.unwrap();

    let msg = recv_of_type(&mut ws, "room-deleted").await;
    assert_eq!(msg["data"]["reason"], "Room closed");
}

// =========================================================================
// Reset
// =========================================================================

#[tokio::test]
async fn test_reset_returns_everyone_to_lobby() {
    let (addr, controller) = start_server().await;
    let (mut ws_ada, mut ws_bo, code, _room) =
        started_game(&addr, &controller).await;

    send_msg(&mut ws_ada, json!({"type": "reset-game", "roomId": code})).await;

    for ws in [&mut ws_ada, &mut ws_bo] {
        let update = recv_of_type(ws, "room-updated").await;
        assert_eq!(update["data"]["state"], "lobby");
        assert_eq!(update["data"]["lives"], 3);
        assert_eq!(update["data"]["timeline"], json!([]));
        let events = update["data"]["gameEvents"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "game-reset");
    }
}

// =========================================================================
// Leaving and disconnects
// =========================================================================

#[tokio::test]
async fn test_leave_room_acknowledges_and_updates_remainder() {
    let (addr, controller) = start_server().await;
    let code = create_room(&controller).await;

    let mut ws_ada = connect(&addr).await;
    let mut ws_bo = connect(&addr).await;
    join(&mut ws_ada, &code, "ada", true).await;
    join(&mut ws_bo, &code, "bo", false).await;
    recv_of_type(&mut ws_ada, "room-updated").await;

    send_msg(&mut ws_bo, json!({"type": "leave-room", "roomId": code})).await;

    let ack = recv_of_type(&mut ws_bo, "left-room").await;
    assert_eq!(ack["type"], "left-room");

    let update = recv_of_type(&mut ws_ada, "room-updated").await;
    let players = update["data"]["players"].as_array().unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["username"], "ada");
}

#[tokio::test]
async fn test_host_disconnect_in_lobby_deletes_room() {
    let (addr, controller) = start_server().await;
    let code = create_room(&controller).await;

    let mut ws_ada = connect(&addr).await;
    let mut ws_bo = connect(&addr).await;
    join(&mut ws_ada, &code, "ada", true).await;
    join(&mut ws_bo, &code, "bo", false).await;

    // The host's connection drops without a leave-room.
    drop(ws_ada);

    let msg = recv_of_type(&mut ws_bo, "room-deleted").await;
    assert_eq!(msg["data"]["reason"], "Host left the lobby");
}

#[tokio::test]
async fn test_host_disconnect_mid_game_reassigns_host() {
    let (addr, controller) = start_server().await;
    let (ws_ada, mut ws_bo, _code, _room) =
        started_game(&addr, &controller).await;

    drop(ws_ada);

    let update = recv_of_type(&mut ws_bo, "room-updated").await;
    let players = update["data"]["players"].as_array().unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["username"], "bo");
    assert_eq!(update["data"]["hostId"], players[0]["id"]);
    assert_eq!(update["data"]["state"], "playing");
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test]
async fn test_rejoin_by_name_rebinds_and_restores_projection() {
    let (addr, controller) = start_server().await;
    let (_ws_ada, ws_bo_old, code, room) =
        started_game(&addr, &controller).await;
    let bo_hand = hands(&room)
        .iter()
        .find(|(n, _)| n == "bo")
        .unwrap()
        .1
        .clone();

    // bo opens a fresh connection and joins under the same name while
    // the old one is still up (network switch). Rebind, not a new player.
    let mut ws_bo_new = connect(&addr).await;
    let update = join(&mut ws_bo_new, &code, "bo", false).await;

    let players = update["data"]["players"].as_array().unwrap();
    assert_eq!(players.len(), 2);
    let bo = players
        .iter()
        .find(|p| p["username"] == "bo")
        .expect("bo still present");
    let rebound_hand: Vec<u8> = bo["numbers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n.as_u64().unwrap() as u8)
        .collect();
    assert_eq!(rebound_hand, bo_hand, "hand survives the reconnect");

    // Mid-game rejoin also receives the projection directly.
    let view = recv_of_type(&mut ws_bo_new, "game-state-updated").await;
    assert_eq!(view["data"]["state"], "playing");

    drop(ws_bo_old);
}
