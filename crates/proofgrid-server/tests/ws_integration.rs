#[allow(dead_code)]
mod common;

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use proofgrid_core::net::messages::{
    ClientMessage, CreateRoomMsg, EndReason, IdentifyMsg, JoinRoomMsg, LeaveRoomMsg, ListRoomsMsg,
    ServerMessage, SetReadyMsg, StartGameMsg, SubmitProofMsg,
};
use proofgrid_core::profile::ProfileStore;
use proofgrid_core::room::{GameMode, RoomState, is_valid_room_code};
use proofgrid_server::auth::sign_session;
use common::{
    TestServer, WsStream, connect_as, eventually, identify_msg, solve, ws_closed, ws_connect,
    ws_create_room, ws_expect_error, ws_identify, ws_join_room, ws_next, ws_send, ws_wait_for,
};

async fn set_ready(stream: &mut WsStream) {
    ws_send(stream, &ClientMessage::SetReady(SetReadyMsg { ready: true })).await;
}

async fn start(stream: &mut WsStream) {
    ws_send(stream, &ClientMessage::StartGame(StartGameMsg {})).await;
}

fn is_game_started(m: &ServerMessage) -> bool {
    matches!(m, ServerMessage::GameStarted(_))
}

#[tokio::test]
async fn identify_returns_id_and_high_score() {
    let server = TestServer::new().await;
    server.state.profiles.record_if_higher("Alice", 40).unwrap();

    let mut stream = ws_connect(&server.ws_url()).await;
    let id = ws_identify(&mut stream, "  Alice ").await;
    assert_eq!(id.display_name, "Alice");
    assert_eq!(id.high_score, Some(40));

    let (_other, newcomer) = connect_as(&server, "Bob").await;
    assert_eq!(newcomer.high_score, None);
    assert_ne!(newcomer.player_id, id.player_id);
}

#[tokio::test]
async fn first_frame_must_be_identify() {
    let server = TestServer::new().await;
    let mut stream = ws_connect(&server.ws_url()).await;
    ws_send(&mut stream, &ClientMessage::ListRooms(ListRoomsMsg {})).await;
    assert_eq!(ws_expect_error(&mut stream).await, "Expected identify");
    assert!(ws_closed(&mut stream).await);
}

#[tokio::test]
async fn text_first_frame_is_rejected() {
    let server = TestServer::new().await;
    let mut stream = ws_connect(&server.ws_url()).await;
    stream
        .send(Message::Text("identify me".into()))
        .await
        .unwrap();
    assert_eq!(ws_expect_error(&mut stream).await, "Expected identify");
    assert!(ws_closed(&mut stream).await);
}

#[tokio::test]
async fn protocol_mismatch_rejected() {
    let server = TestServer::new().await;
    let mut stream = ws_connect(&server.ws_url()).await;
    ws_send(
        &mut stream,
        &ClientMessage::Identify(IdentifyMsg {
            player_name: "Alice".into(),
            token: None,
            protocol_version: 99,
        }),
    )
    .await;
    let err = ws_expect_error(&mut stream).await;
    assert!(err.contains("Protocol version mismatch"), "got: {err}");
    assert!(ws_closed(&mut stream).await);
}

#[tokio::test]
async fn invalid_name_rejected() {
    let server = TestServer::new().await;
    let long = "x".repeat(33);
    for name in ["   ", "a\u{7}b", long.as_str()] {
        let mut stream = ws_connect(&server.ws_url()).await;
        ws_send(&mut stream, &identify_msg(name, None)).await;
        assert_eq!(ws_expect_error(&mut stream).await, "Invalid player name");
    }
}

#[tokio::test]
async fn identity_token_checked_when_secret_configured() {
    let server = TestServer::with_auth(None, Some("s3cret")).await;

    let mut stream = ws_connect(&server.ws_url()).await;
    ws_send(&mut stream, &identify_msg("Alice", Some("deadbeef".into()))).await;
    assert_eq!(ws_expect_error(&mut stream).await, "Invalid identity token");

    let mut stream = ws_connect(&server.ws_url()).await;
    ws_send(&mut stream, &identify_msg("Alice", None)).await;
    assert_eq!(ws_expect_error(&mut stream).await, "Invalid identity token");

    let mut stream = ws_connect(&server.ws_url()).await;
    let token = sign_session("s3cret", "Alice").unwrap();
    ws_send(&mut stream, &identify_msg("Alice", Some(token))).await;
    assert!(matches!(ws_next(&mut stream).await, ServerMessage::Identified(_)));
}

#[tokio::test]
async fn create_room_and_discover_it() {
    let server = TestServer::new().await;
    let (mut alice, alice_id) = connect_as(&server, "Alice").await;
    let (mut observer, _) = connect_as(&server, "Olive").await;

    let created = ws_create_room(&mut alice, GameMode::Swarm, 4).await;
    assert!(is_valid_room_code(&created.room.id));
    assert_eq!(created.room.mode, GameMode::Swarm);
    assert_eq!(created.room.max_players, 4);
    assert_eq!(created.room.state, RoomState::Waiting);
    assert_eq!(created.room.host_name.as_deref(), Some("Alice"));
    assert_eq!(created.players.len(), 1);
    assert_eq!(created.players[0].player_id, alice_id.player_id);
    assert!(created.players[0].is_host);

    ws_wait_for(&mut observer, |m| matches!(m, ServerMessage::RoomsUpdated(_))).await;
    ws_send(&mut observer, &ClientMessage::ListRooms(ListRoomsMsg {})).await;
    match ws_wait_for(&mut observer, |m| matches!(m, ServerMessage::RoomsList(_))).await {
        ServerMessage::RoomsList(list) => {
            assert_eq!(list.rooms.len(), 1);
            assert_eq!(list.rooms[0].id, created.room.id);
            assert_eq!(list.rooms[0].player_count, 1);
        },
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn create_room_clamps_settings() {
    let server = TestServer::new().await;
    let (mut alice, _) = connect_as(&server, "Alice").await;
    ws_send(
        &mut alice,
        &ClientMessage::CreateRoom(CreateRoomMsg {
            mode: GameMode::Duel,
            duration_minutes: 500,
            max_players: 9,
        }),
    )
    .await;
    match ws_next(&mut alice).await {
        ServerMessage::RoomCreated(created) => {
            assert_eq!(created.room.max_players, 2);
            assert_eq!(created.room.duration_secs, 30 * 60);
        },
        other => panic!("Expected RoomCreated, got: {other:?}"),
    }
}

#[tokio::test]
async fn join_errors_reported_to_requester() {
    let server = TestServer::new().await;
    let (mut alice, _) = connect_as(&server, "Alice").await;
    let (mut bob, _) = connect_as(&server, "Bob").await;

    ws_send(
        &mut bob,
        &ClientMessage::JoinRoom(JoinRoomMsg {
            room_id: "nope".into(),
        }),
    )
    .await;
    assert_eq!(ws_expect_error(&mut bob).await, "Invalid room id");

    ws_send(
        &mut bob,
        &ClientMessage::JoinRoom(JoinRoomMsg {
            room_id: "ZZZZ-9999".into(),
        }),
    )
    .await;
    assert_eq!(ws_expect_error(&mut bob).await, "Room not found");

    let created = ws_create_room(&mut alice, GameMode::Duel, 2).await;
    ws_send(
        &mut alice,
        &ClientMessage::JoinRoom(JoinRoomMsg {
            room_id: created.room.id.clone(),
        }),
    )
    .await;
    assert_eq!(ws_expect_error(&mut alice).await, "Already in a room");

    // Lower-case codes are accepted
    let joined = ws_join_room(&mut bob, &created.room.id.to_lowercase()).await;
    assert_eq!(joined.players.len(), 2);

    let (mut carol, _) = connect_as(&server, "Carol").await;
    ws_send(
        &mut carol,
        &ClientMessage::JoinRoom(JoinRoomMsg {
            room_id: created.room.id.clone(),
        }),
    )
    .await;
    assert_eq!(ws_expect_error(&mut carol).await, "Room is full");
}

#[tokio::test]
async fn duplicate_display_name_rejected() {
    let server = TestServer::new().await;
    let (mut first, _) = connect_as(&server, "Alice").await;
    let (mut second, _) = connect_as(&server, "Alice").await;
    let created = ws_create_room(&mut first, GameMode::Swarm, 4).await;
    ws_send(
        &mut second,
        &ClientMessage::JoinRoom(JoinRoomMsg {
            room_id: created.room.id,
        }),
    )
    .await;
    assert_eq!(
        ws_expect_error(&mut second).await,
        "Alice is already in this room"
    );
}

#[tokio::test]
async fn room_requests_need_a_room() {
    let server = TestServer::new().await;
    let (mut alice, _) = connect_as(&server, "Alice").await;
    set_ready(&mut alice).await;
    assert_eq!(ws_expect_error(&mut alice).await, "Not in a room");
    ws_send(
        &mut alice,
        &ClientMessage::SubmitProof(SubmitProofMsg {
            selected_cells: vec![0, 1, 10, 11],
        }),
    )
    .await;
    assert_eq!(ws_expect_error(&mut alice).await, "Not in a room");
}

#[tokio::test]
async fn start_gates() {
    let server = TestServer::new().await;
    let (mut alice, _) = connect_as(&server, "Alice").await;
    let created = ws_create_room(&mut alice, GameMode::Duel, 2).await;

    set_ready(&mut alice).await;
    start(&mut alice).await;
    assert_eq!(
        ws_expect_error(&mut alice).await,
        "Duel requires exactly 2 players to start (1 present)"
    );

    ws_send(
        &mut alice,
        &ClientMessage::SubmitProof(SubmitProofMsg {
            selected_cells: vec![0, 1, 10, 11],
        }),
    )
    .await;
    assert_eq!(ws_expect_error(&mut alice).await, "Game not active");

    let (mut bob, _) = connect_as(&server, "Bob").await;
    ws_join_room(&mut bob, &created.room.id).await;
    start(&mut alice).await;
    assert_eq!(ws_expect_error(&mut alice).await, "Not all players are ready");

    set_ready(&mut bob).await;
    start(&mut bob).await;
    assert_eq!(
        ws_expect_error(&mut bob).await,
        "Only the host can start the game"
    );
}

#[tokio::test]
async fn duel_plays_and_ends_when_opponent_leaves() {
    let server = TestServer::new().await;
    let (mut alice, _) = connect_as(&server, "Alice").await;
    let created = ws_create_room(&mut alice, GameMode::Duel, 2).await;

    let (mut bob, bob_id) = connect_as(&server, "Bob").await;
    ws_join_room(&mut bob, &created.room.id).await;
    match ws_next(&mut alice).await {
        ServerMessage::PlayerJoined(p) => {
            assert_eq!(p.player_id, bob_id.player_id);
            assert_eq!(p.display_name, "Bob");
            assert_eq!(p.players.len(), 2);
        },
        other => panic!("Expected PlayerJoined, got: {other:?}"),
    }

    set_ready(&mut alice).await;
    set_ready(&mut bob).await;
    ws_wait_for(&mut alice, |m| {
        matches!(m, ServerMessage::ReadyUpdate(r) if r.all_ready)
    })
    .await;
    start(&mut alice).await;

    ws_wait_for(&mut alice, is_game_started).await;
    let started = match ws_wait_for(&mut bob, is_game_started).await {
        ServerMessage::GameStarted(s) => s,
        _ => unreachable!(),
    };
    assert_eq!(started.grid_size, 10);
    assert_eq!(started.initial_challenges.len(), 5);
    assert_eq!(started.remaining_secs, 300);

    let target = started.initial_challenges[0].clone();
    ws_send(
        &mut bob,
        &ClientMessage::SubmitProof(SubmitProofMsg {
            selected_cells: solve(&target),
        }),
    )
    .await;
    match ws_wait_for(&mut bob, |m| matches!(m, ServerMessage::ProofResult(_))).await {
        ServerMessage::ProofResult(r) => {
            assert!(r.correct);
            assert_eq!(r.score, 10);
            assert_eq!(r.challenge_id.as_deref(), Some(target.id.as_str()));
            assert_eq!(
                r.message,
                format!("Proof of {} successful! +10 points!", target.name)
            );
        },
        _ => unreachable!(),
    }

    // Everyone sees the new standings
    ws_wait_for(&mut alice, |m| match m {
        ServerMessage::StateUpdate(s) => s
            .leaderboard
            .first()
            .is_some_and(|e| e.display_name == "Bob" && e.score == 10),
        _ => false,
    })
    .await;

    ws_send(
        &mut bob,
        &ClientMessage::SubmitProof(SubmitProofMsg {
            selected_cells: vec![0],
        }),
    )
    .await;
    match ws_wait_for(&mut bob, |m| matches!(m, ServerMessage::ProofResult(_))).await {
        ServerMessage::ProofResult(r) => {
            assert!(!r.correct);
            assert_eq!(r.score, 5);
            assert_eq!(r.message, "Incorrect proof. -5 points!");
        },
        _ => unreachable!(),
    }

    bob.close(None).await.unwrap();

    match ws_wait_for(&mut alice, |m| matches!(m, ServerMessage::PlayerLeft(_))).await {
        ServerMessage::PlayerLeft(p) => assert_eq!(p.player_id, bob_id.player_id),
        _ => unreachable!(),
    }
    match ws_wait_for(&mut alice, |m| matches!(m, ServerMessage::GameEnded(_))).await {
        ServerMessage::GameEnded(end) => {
            assert_eq!(end.reason, EndReason::PlayerLeft);
            assert_eq!(end.message, "Bob left the game. Game Over.");
            assert_eq!(end.final_results.len(), 1);
            assert_eq!(end.final_results[0].display_name, "Alice");
        },
        _ => unreachable!(),
    }

    let profiles = std::sync::Arc::clone(&server.state.profiles);
    assert!(eventually(|| profiles.high_score("Alice").ok().flatten() == Some(0)).await);
    assert!(eventually(|| server.state.rooms.try_read().is_ok_and(|r| r.is_empty())).await);

    // The finished room no longer holds Alice
    let again = ws_create_room(&mut alice, GameMode::Duel, 2).await;
    assert_ne!(again.room.id, created.room.id);
}

#[tokio::test]
async fn swarm_host_leaving_migrates_and_game_continues() {
    let server = TestServer::new().await;
    let (mut alice, _) = connect_as(&server, "Alice").await;
    let created = ws_create_room(&mut alice, GameMode::Swarm, 4).await;
    let code = created.room.id.clone();

    let (mut bob, bob_id) = connect_as(&server, "Bob").await;
    let (mut carol, _) = connect_as(&server, "Carol").await;
    ws_join_room(&mut bob, &code).await;
    ws_join_room(&mut carol, &code).await;

    for stream in [&mut alice, &mut bob, &mut carol] {
        set_ready(stream).await;
    }
    ws_wait_for(&mut alice, |m| {
        matches!(m, ServerMessage::ReadyUpdate(r) if r.all_ready)
    })
    .await;
    start(&mut alice).await;
    for stream in [&mut alice, &mut bob, &mut carol] {
        ws_wait_for(stream, is_game_started).await;
    }

    ws_send(
        &mut alice,
        &ClientMessage::LeaveRoom(LeaveRoomMsg {
            room_id: code.clone(),
        }),
    )
    .await;
    // The leaver sees its own departure
    ws_wait_for(&mut alice, |m| matches!(m, ServerMessage::PlayerLeft(_))).await;

    match ws_wait_for(&mut bob, |m| matches!(m, ServerMessage::PlayerLeft(_))).await {
        ServerMessage::PlayerLeft(p) => {
            assert_eq!(p.display_name, "Alice");
            assert_eq!(p.new_host_id, Some(bob_id.player_id));
            assert_eq!(p.players.len(), 2);
            assert!(p.players.iter().any(|e| e.display_name == "Bob" && e.is_host));
        },
        _ => unreachable!(),
    }

    // Still ticking for the remaining players
    match ws_wait_for(&mut carol, |m| matches!(m, ServerMessage::StateUpdate(_))).await {
        ServerMessage::StateUpdate(s) => {
            assert_eq!(s.leaderboard.len(), 2);
            assert!(s.remaining_secs <= 300);
        },
        _ => unreachable!(),
    }

    // Alice is free to host again
    ws_create_room(&mut alice, GameMode::Duel, 2).await;
}

#[tokio::test]
async fn last_player_leaving_removes_room() {
    let server = TestServer::new().await;
    let (mut alice, _) = connect_as(&server, "Alice").await;
    let created = ws_create_room(&mut alice, GameMode::Duel, 2).await;
    assert!(eventually(|| server.state.rooms.try_read().is_ok_and(|r| r.len() == 1)).await);

    ws_send(
        &mut alice,
        &ClientMessage::LeaveRoom(LeaveRoomMsg {
            room_id: "ZZZZ-0000".into(),
        }),
    )
    .await;
    assert_eq!(ws_expect_error(&mut alice).await, "Not in a room");

    ws_send(
        &mut alice,
        &ClientMessage::LeaveRoom(LeaveRoomMsg {
            room_id: created.room.id,
        }),
    )
    .await;
    ws_wait_for(&mut alice, |m| matches!(m, ServerMessage::PlayerLeft(_))).await;
    assert!(eventually(|| server.state.rooms.try_read().is_ok_and(|r| r.is_empty())).await);
}
