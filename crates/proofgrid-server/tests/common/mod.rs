use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use proofgrid_core::challenge::Challenge;
use proofgrid_core::net::messages::{
    ClientMessage, CreateRoomMsg, IdentifiedMsg, IdentifyMsg, JoinRoomMsg, RoomCreatedMsg,
    RoomJoinedMsg, ServerMessage,
};
use proofgrid_core::net::protocol::{PROTOCOL_VERSION, decode_server_message, encode_client_message};
use proofgrid_core::room::GameMode;
use proofgrid_core::test_helpers::solve_at;

use proofgrid_server::build_app;
use proofgrid_server::config::{AuthFileConfig, ServerConfig};
use proofgrid_server::state::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with no auth.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// Start a test server with a REST bearer token and optional identity
    /// signing key.
    pub async fn with_auth(token: Option<&str>, session_secret: Option<&str>) -> Self {
        let config = ServerConfig {
            auth: AuthFileConfig {
                bearer_token: token.map(str::to_string),
                session_secret: session_secret.map(str::to_string),
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send a ClientMessage from a WS stream.
pub async fn ws_send(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Read the next ServerMessage, lobby hints included (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Next message that is not a `RoomsUpdated` hint.
pub async fn ws_next(stream: &mut WsStream) -> ServerMessage {
    ws_wait_for(stream, |m| !matches!(m, ServerMessage::RoomsUpdated(_))).await
}

/// Skip messages until one satisfies `pred` (5s per read).
pub async fn ws_wait_for(
    stream: &mut WsStream,
    pred: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    loop {
        let msg = ws_read_server_msg(stream).await;
        if pred(&msg) {
            return msg;
        }
    }
}

/// True when the server closes the socket (or stops talking) within 2s
/// without sending another binary frame.
pub async fn ws_closed(stream: &mut WsStream) -> bool {
    let res = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(_))) => return false,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return true,
                _ => continue,
            }
        }
    })
    .await;
    res.unwrap_or(false)
}

pub fn identify_msg(name: &str, token: Option<String>) -> ClientMessage {
    ClientMessage::Identify(IdentifyMsg {
        player_name: name.to_string(),
        token,
        protocol_version: PROTOCOL_VERSION,
    })
}

/// Identify with `name` and return the server's acknowledgement.
pub async fn ws_identify(stream: &mut WsStream, name: &str) -> IdentifiedMsg {
    ws_send(stream, &identify_msg(name, None)).await;
    match ws_next(stream).await {
        ServerMessage::Identified(id) => id,
        other => panic!("Expected Identified, got: {other:?}"),
    }
}

/// Open a connection and identify in one step.
pub async fn connect_as(server: &TestServer, name: &str) -> (WsStream, IdentifiedMsg) {
    let mut stream = ws_connect(&server.ws_url()).await;
    let id = ws_identify(&mut stream, name).await;
    (stream, id)
}

pub async fn ws_create_room(stream: &mut WsStream, mode: GameMode, max_players: u32) -> RoomCreatedMsg {
    ws_send(
        stream,
        &ClientMessage::CreateRoom(CreateRoomMsg {
            mode,
            duration_minutes: 5,
            max_players,
        }),
    )
    .await;
    match ws_next(stream).await {
        ServerMessage::RoomCreated(created) => created,
        other => panic!("Expected RoomCreated, got: {other:?}"),
    }
}

pub async fn ws_join_room(stream: &mut WsStream, room_id: &str) -> RoomJoinedMsg {
    ws_send(
        stream,
        &ClientMessage::JoinRoom(JoinRoomMsg {
            room_id: room_id.to_string(),
        }),
    )
    .await;
    match ws_next(stream).await {
        ServerMessage::RoomJoined(joined) => joined,
        other => panic!("Expected RoomJoined, got: {other:?}"),
    }
}

/// Wait for the next `Error` frame and return its message.
pub async fn ws_expect_error(stream: &mut WsStream) -> String {
    match ws_wait_for(stream, |m| matches!(m, ServerMessage::Error(_))).await {
        ServerMessage::Error(e) => e.message,
        _ => unreachable!(),
    }
}

/// A selection that proves `challenge` at the grid origin.
pub fn solve(challenge: &Challenge) -> Vec<u32> {
    solve_at(&challenge.cells, 0, 0, 10)
}

/// Poll `check` for up to 2s.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
