use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use proofgrid_core::net::messages::{
    ClientMessage, CreateRoomMsg, IdentifiedMsg, RoomsListMsg, ServerMessage,
};
use proofgrid_core::net::protocol::{
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION, decode_client_message, encode_server_message,
};
use proofgrid_core::player::{PlayerId, normalize_display_name};
use proofgrid_core::room::{Room, RoomError, is_valid_room_code};

use crate::rate_limit::TokenBucket;
use crate::room_loop::{Reply, RoomCommand, RoomContext, spawn_room};
use crate::room_registry::PlayerSender;
use crate::state::{AppState, ConnectionGuard};

/// How long a fresh connection has to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocket, Message>;

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(name) = identify(&mut ws_sender, &mut ws_receiver, &state).await else {
        return;
    };

    let player_id = state.rooms.write().await.alloc_player_id();
    let high_score = lookup_high_score(&state, &name).await;
    let identified = ServerMessage::Identified(IdentifiedMsg {
        player_id,
        display_name: name.clone(),
        high_score,
    });
    if !send_direct(&mut ws_sender, &identified).await {
        return;
    }
    tracing::info!(player_id, name = %name, "Player connected");

    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    let writer = spawn_writer(ws_sender, rx, state.lobby.subscribe());

    let mut session = Session {
        player_id,
        name,
        tx,
        room: None,
    };
    read_loop(&mut ws_receiver, &state, &mut session).await;

    // Disconnect counts as leaving whatever room the player was in
    session.leave_current().await;
    writer.abort();
    tracing::info!(player_id, name = %session.name, "Player disconnected");
}

/// Wait for the `Identify` frame and validate it. Any failure is reported
/// to the client before the connection is dropped.
async fn identify(
    ws_sender: &mut WsSink,
    ws_receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> Option<String> {
    let first = match tokio::time::timeout(IDENTIFY_TIMEOUT, ws_receiver.next()).await {
        Ok(Some(Ok(Message::Binary(data)))) => data,
        Ok(Some(Ok(Message::Close(_)) | Err(_)) | None) => return None,
        Ok(Some(Ok(_))) => {
            send_direct(ws_sender, &ServerMessage::error("Expected identify")).await;
            return None;
        },
        Err(_) => {
            tracing::debug!("Connection closed before identify");
            return None;
        },
    };

    let msg = match decode_client_message(&first) {
        Ok(ClientMessage::Identify(msg)) => msg,
        _ => {
            send_direct(ws_sender, &ServerMessage::error("Expected identify")).await;
            return None;
        },
    };

    if msg.protocol_version != PROTOCOL_VERSION {
        let error = format!(
            "Protocol version mismatch: client={}, server={}",
            msg.protocol_version, PROTOCOL_VERSION
        );
        send_direct(ws_sender, &ServerMessage::error(error)).await;
        return None;
    }

    let Some(name) = normalize_display_name(&msg.player_name) else {
        send_direct(ws_sender, &ServerMessage::error("Invalid player name")).await;
        return None;
    };

    if !state.auth.accepts_identity(&name, msg.token.as_deref()) {
        tracing::warn!(name = %name, "Rejected identity token");
        send_direct(ws_sender, &ServerMessage::error("Invalid identity token")).await;
        return None;
    }

    Some(name)
}

async fn lookup_high_score(state: &AppState, name: &str) -> Option<u32> {
    let profiles = Arc::clone(&state.profiles);
    let owned = name.to_string();
    match tokio::task::spawn_blocking(move || profiles.high_score(&owned)).await {
        Ok(Ok(score)) => score,
        Ok(Err(e)) => {
            tracing::warn!(name, error = %e, "Profile lookup failed");
            None
        },
        Err(e) => {
            tracing::warn!(name, error = %e, "Profile lookup task failed");
            None
        },
    }
}

/// Send on the raw socket, before the writer task owns it.
async fn send_direct(ws_sender: &mut WsSink, msg: &ServerMessage) -> bool {
    let data = match encode_server_message(msg) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(msg_type = ?msg.message_type(), error = %e, "Failed to encode");
            return false;
        },
    };
    match ws_sender.send(Message::Binary(data.into())).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to send on socket");
            false
        },
    }
}

/// Forward room frames and lobby notifications to the socket.
fn spawn_writer(
    mut ws_sender: WsSink,
    mut rx: mpsc::Receiver<Bytes>,
    mut lobby: broadcast::Receiver<Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let data = tokio::select! {
                msg = rx.recv() => match msg {
                    Some(data) => data,
                    None => break,
                },
                note = lobby.recv() => match note {
                    Ok(data) => data,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Lobby notifications lagged");
                        continue;
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    })
}

async fn read_loop(ws_receiver: &mut SplitStream<WebSocket>, state: &AppState, session: &mut Session) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = TokenBucket::new(rate, rate);
    let player_id = session.player_id;

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if !rate_limiter.allow() {
            tracing::warn!(player_id, "Rate limited");
            continue;
        }

        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        let msg = match decode_client_message(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(player_id, error = %e, "Dropping undecodable frame");
                continue;
            },
        };

        let msg_type = msg.message_type();
        if let Err(e) = session.dispatch(msg, state).await {
            tracing::debug!(player_id, ?msg_type, error = %e, "Request rejected");
            session.reply(&ServerMessage::error(e.to_string()));
        }
    }
}

struct JoinedRoom {
    code: String,
    commands: mpsc::UnboundedSender<RoomCommand>,
}

/// One identified connection and the room it currently sits in.
struct Session {
    player_id: PlayerId,
    name: String,
    tx: PlayerSender,
    room: Option<JoinedRoom>,
}

impl Session {
    async fn dispatch(&mut self, msg: ClientMessage, state: &AppState) -> Result<(), RoomError> {
        let player_id = self.player_id;
        match msg {
            ClientMessage::Identify(_) => {
                tracing::debug!(player_id, "Ignoring repeated identify");
                Ok(())
            },
            ClientMessage::ListRooms(_) => {
                let rooms = state.rooms.read().await.waiting_rooms();
                self.reply(&ServerMessage::RoomsList(RoomsListMsg { rooms }));
                Ok(())
            },
            ClientMessage::CreateRoom(create) => self.create_room(&create, state).await,
            ClientMessage::JoinRoom(join) => self.join_room(&join.room_id, state).await,
            ClientMessage::LeaveRoom(leave) => {
                match self.current_room() {
                    Some(joined) if joined.code.eq_ignore_ascii_case(leave.room_id.trim()) => {},
                    _ => return Err(RoomError::NotInRoom),
                }
                self.leave_current().await;
                Ok(())
            },
            ClientMessage::SetReady(r) => {
                self.request(|reply| RoomCommand::SetReady {
                    player_id,
                    ready: r.ready,
                    reply,
                })
                .await
            },
            ClientMessage::StartGame(_) => {
                self.request(|reply| RoomCommand::Start { player_id, reply })
                    .await
            },
            ClientMessage::SubmitProof(p) => {
                self.request(|reply| RoomCommand::SubmitProof {
                    player_id,
                    selected_cells: p.selected_cells,
                    reply,
                })
                .await
            },
        }
    }

    /// The room this session is seated in, forgetting it once its loop has
    /// shut down.
    fn current_room(&mut self) -> Option<&JoinedRoom> {
        if self
            .room
            .as_ref()
            .is_some_and(|joined| joined.commands.is_closed())
        {
            self.room = None;
        }
        self.room.as_ref()
    }

    async fn create_room(&mut self, create: &CreateRoomMsg, state: &AppState) -> Result<(), RoomError> {
        if self.current_room().is_some() {
            return Err(RoomError::AlreadyInRoom);
        }
        let settings =
            state
                .config
                .game
                .room_settings(create.mode, create.duration_minutes, create.max_players);
        let ctx = RoomContext::from_state(state);

        // Held across spawn and insert so a lobby listing never misses
        // a room that announced itself
        let mut rooms = state.rooms.write().await;
        let code = rooms.unique_code();
        let room = Room::new(code.clone(), settings, self.player_id, self.name.clone())?;
        let (handle, _task) = spawn_room(room, self.tx.clone(), ctx);
        let commands = handle.commands.clone();
        rooms.insert(code.clone(), handle);
        drop(rooms);

        self.room = Some(JoinedRoom { code, commands });
        Ok(())
    }

    async fn join_room(&mut self, room_id: &str, state: &AppState) -> Result<(), RoomError> {
        if self.current_room().is_some() {
            return Err(RoomError::AlreadyInRoom);
        }
        let code = room_id.trim().to_ascii_uppercase();
        if !is_valid_room_code(&code) {
            return Err(RoomError::InvalidRoomId);
        }
        let commands = state
            .rooms
            .read()
            .await
            .get(&code)
            .map(|handle| handle.commands.clone())
            .ok_or(RoomError::RoomNotFound)?;

        let (reply, result) = oneshot::channel();
        commands
            .send(RoomCommand::Join {
                player_id: self.player_id,
                display_name: self.name.clone(),
                sender: self.tx.clone(),
                reply,
            })
            .map_err(|_| RoomError::RoomNotFound)?;
        result.await.map_err(|_| RoomError::RoomNotFound)??;

        self.room = Some(JoinedRoom { code, commands });
        Ok(())
    }

    /// Round-trip a command to the current room and surface its verdict.
    async fn request(&mut self, make: impl FnOnce(Reply) -> RoomCommand) -> Result<(), RoomError> {
        let joined = self.current_room().ok_or(RoomError::NotInRoom)?;
        let (reply, result) = oneshot::channel();
        if joined.commands.send(make(reply)).is_err() {
            self.room = None;
            return Err(RoomError::RoomNotFound);
        }
        match result.await {
            Ok(verdict) => verdict,
            Err(_) => {
                self.room = None;
                Err(RoomError::RoomNotFound)
            },
        }
    }

    async fn leave_current(&mut self) {
        let Some(joined) = self.room.take() else {
            return;
        };
        let (ack, done) = oneshot::channel();
        if joined
            .commands
            .send(RoomCommand::Leave {
                player_id: self.player_id,
                ack,
            })
            .is_ok()
        {
            // A closed room drops the ack; either way the player is out
            let _ = done.await;
        }
        tracing::debug!(player_id = self.player_id, room = %joined.code, "Session left room");
    }

    fn reply(&self, msg: &ServerMessage) {
        match encode_server_message(msg) {
            Ok(data) => {
                if let Err(e) = self.tx.try_send(Bytes::from(data)) {
                    tracing::debug!(player_id = self.player_id, error = %e, "Failed to queue reply");
                }
            },
            Err(e) => {
                tracing::error!(msg_type = ?msg.message_type(), error = %e, "Failed to encode");
            },
        }
    }
}
