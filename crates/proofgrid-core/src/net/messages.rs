use serde::{Deserialize, Serialize};

use crate::challenge::Challenge;
use crate::player::{LeaderboardEntry, PlayerId};
use crate::room::{GameMode, RoomInfo};

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    Identify = 0x01,
    ListRooms = 0x02,
    CreateRoom = 0x03,
    JoinRoom = 0x04,
    LeaveRoom = 0x05,
    SetReady = 0x06,
    StartGame = 0x07,
    SubmitProof = 0x08,

    // Server -> Client (session and room)
    Identified = 0x10,
    Error = 0x11,
    RoomCreated = 0x12,
    RoomJoined = 0x13,
    PlayerJoined = 0x14,
    PlayerLeft = 0x15,
    ReadyUpdate = 0x16,
    GameStarted = 0x17,
    StateUpdate = 0x18,
    ProofResult = 0x19,
    GameEnded = 0x1A,

    // Server -> Client (lobby)
    RoomsList = 0x20,
    RoomsUpdated = 0x21,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Identify),
            0x02 => Some(Self::ListRooms),
            0x03 => Some(Self::CreateRoom),
            0x04 => Some(Self::JoinRoom),
            0x05 => Some(Self::LeaveRoom),
            0x06 => Some(Self::SetReady),
            0x07 => Some(Self::StartGame),
            0x08 => Some(Self::SubmitProof),
            0x10 => Some(Self::Identified),
            0x11 => Some(Self::Error),
            0x12 => Some(Self::RoomCreated),
            0x13 => Some(Self::RoomJoined),
            0x14 => Some(Self::PlayerJoined),
            0x15 => Some(Self::PlayerLeft),
            0x16 => Some(Self::ReadyUpdate),
            0x17 => Some(Self::GameStarted),
            0x18 => Some(Self::StateUpdate),
            0x19 => Some(Self::ProofResult),
            0x1A => Some(Self::GameEnded),
            0x20 => Some(Self::RoomsList),
            0x21 => Some(Self::RoomsUpdated),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> Server payloads
// ---------------------------------------------------------------------------

/// Must be the first frame on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyMsg {
    pub player_name: String,
    /// Hex HMAC issued by the identity service. Ignored when the server has
    /// no session secret configured.
    pub token: Option<String>,
    pub protocol_version: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRoomsMsg {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomMsg {
    pub mode: GameMode,
    pub duration_minutes: u32,
    pub max_players: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomMsg {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRoomMsg {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReadyMsg {
    pub ready: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGameMsg {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitProofMsg {
    /// Flat cell indices, `row * grid_size + col`.
    pub selected_cells: Vec<u32>,
}

// ---------------------------------------------------------------------------
// Server -> Client payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedMsg {
    pub player_id: PlayerId,
    pub display_name: String,
    pub high_score: Option<u32>,
}

/// Rejection of the sender's last request. Never broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCreatedMsg {
    pub room: RoomInfo,
    pub players: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomJoinedMsg {
    pub room: RoomInfo,
    pub players: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerJoinedMsg {
    pub player_id: PlayerId,
    pub display_name: String,
    pub players: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLeftMsg {
    pub player_id: PlayerId,
    pub display_name: String,
    pub new_host_id: Option<PlayerId>,
    pub players: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyUpdateMsg {
    pub player_id: PlayerId,
    pub ready: bool,
    pub all_ready: bool,
    pub players: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStartedMsg {
    pub grid_size: u32,
    pub remaining_secs: u64,
    pub initial_challenges: Vec<Challenge>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdateMsg {
    pub remaining_secs: u64,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub active_challenges: Vec<Challenge>,
}

/// Private to the submitting player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResultMsg {
    pub correct: bool,
    pub message: String,
    pub challenge_id: Option<String>,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    TimeUp,
    PlayerLeft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEndedMsg {
    pub reason: EndReason,
    pub message: String,
    pub final_results: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomsListMsg {
    pub rooms: Vec<RoomInfo>,
}

/// Hint that the lobby changed; clients re-query with `ListRooms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomsUpdatedMsg {}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Identify(IdentifyMsg),
    ListRooms(ListRoomsMsg),
    CreateRoom(CreateRoomMsg),
    JoinRoom(JoinRoomMsg),
    LeaveRoom(LeaveRoomMsg),
    SetReady(SetReadyMsg),
    StartGame(StartGameMsg),
    SubmitProof(SubmitProofMsg),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Identify(_) => MessageType::Identify,
            Self::ListRooms(_) => MessageType::ListRooms,
            Self::CreateRoom(_) => MessageType::CreateRoom,
            Self::JoinRoom(_) => MessageType::JoinRoom,
            Self::LeaveRoom(_) => MessageType::LeaveRoom,
            Self::SetReady(_) => MessageType::SetReady,
            Self::StartGame(_) => MessageType::StartGame,
            Self::SubmitProof(_) => MessageType::SubmitProof,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Identified(IdentifiedMsg),
    Error(ErrorMsg),
    RoomCreated(RoomCreatedMsg),
    RoomJoined(RoomJoinedMsg),
    PlayerJoined(PlayerJoinedMsg),
    PlayerLeft(PlayerLeftMsg),
    ReadyUpdate(ReadyUpdateMsg),
    GameStarted(GameStartedMsg),
    StateUpdate(StateUpdateMsg),
    ProofResult(ProofResultMsg),
    GameEnded(GameEndedMsg),
    RoomsList(RoomsListMsg),
    RoomsUpdated(RoomsUpdatedMsg),
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Identified(_) => MessageType::Identified,
            Self::Error(_) => MessageType::Error,
            Self::RoomCreated(_) => MessageType::RoomCreated,
            Self::RoomJoined(_) => MessageType::RoomJoined,
            Self::PlayerJoined(_) => MessageType::PlayerJoined,
            Self::PlayerLeft(_) => MessageType::PlayerLeft,
            Self::ReadyUpdate(_) => MessageType::ReadyUpdate,
            Self::GameStarted(_) => MessageType::GameStarted,
            Self::StateUpdate(_) => MessageType::StateUpdate,
            Self::ProofResult(_) => MessageType::ProofResult,
            Self::GameEnded(_) => MessageType::GameEnded,
            Self::RoomsList(_) => MessageType::RoomsList,
            Self::RoomsUpdated(_) => MessageType::RoomsUpdated,
        }
    }

    /// Convenience constructor for the per-session rejection event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMsg {
            message: message.into(),
        })
    }
}
