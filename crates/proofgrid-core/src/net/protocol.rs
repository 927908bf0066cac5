use serde::{Deserialize, Serialize};

use super::messages::{
    ClientMessage, CreateRoomMsg, ErrorMsg, GameEndedMsg, GameStartedMsg, IdentifiedMsg,
    IdentifyMsg, JoinRoomMsg, LeaveRoomMsg, ListRoomsMsg, MessageType, PlayerJoinedMsg,
    PlayerLeftMsg, ProofResultMsg, ReadyUpdateMsg, RoomCreatedMsg, RoomJoinedMsg, RoomsListMsg,
    RoomsUpdatedMsg, ServerMessage, SetReadyMsg, StartGameMsg, StateUpdateMsg, SubmitProofMsg,
};

/// Current protocol version. Carried in `Identify`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    let t = msg.message_type();
    match msg {
        ClientMessage::Identify(m) => encode_message(t, m),
        ClientMessage::ListRooms(m) => encode_message(t, m),
        ClientMessage::CreateRoom(m) => encode_message(t, m),
        ClientMessage::JoinRoom(m) => encode_message(t, m),
        ClientMessage::LeaveRoom(m) => encode_message(t, m),
        ClientMessage::SetReady(m) => encode_message(t, m),
        ClientMessage::StartGame(m) => encode_message(t, m),
        ClientMessage::SubmitProof(m) => encode_message(t, m),
    }
}

pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    let t = msg.message_type();
    match msg {
        ServerMessage::Identified(m) => encode_message(t, m),
        ServerMessage::Error(m) => encode_message(t, m),
        ServerMessage::RoomCreated(m) => encode_message(t, m),
        ServerMessage::RoomJoined(m) => encode_message(t, m),
        ServerMessage::PlayerJoined(m) => encode_message(t, m),
        ServerMessage::PlayerLeft(m) => encode_message(t, m),
        ServerMessage::ReadyUpdate(m) => encode_message(t, m),
        ServerMessage::GameStarted(m) => encode_message(t, m),
        ServerMessage::StateUpdate(m) => encode_message(t, m),
        ServerMessage::ProofResult(m) => encode_message(t, m),
        ServerMessage::GameEnded(m) => encode_message(t, m),
        ServerMessage::RoomsList(m) => encode_message(t, m),
        ServerMessage::RoomsUpdated(m) => encode_message(t, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    let Some(&first) = data.first() else {
        return Err(ProtocolError::EmptyMessage);
    };
    MessageType::from_byte(first).ok_or(ProtocolError::UnknownMessageType(first))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    match decode_message_type(data)? {
        MessageType::Identify => Ok(ClientMessage::Identify(decode_payload::<IdentifyMsg>(
            data,
        )?)),
        MessageType::ListRooms => Ok(ClientMessage::ListRooms(decode_payload::<ListRoomsMsg>(
            data,
        )?)),
        MessageType::CreateRoom => Ok(ClientMessage::CreateRoom(decode_payload::<
            CreateRoomMsg,
        >(data)?)),
        MessageType::JoinRoom => Ok(ClientMessage::JoinRoom(decode_payload::<JoinRoomMsg>(
            data,
        )?)),
        MessageType::LeaveRoom => Ok(ClientMessage::LeaveRoom(decode_payload::<LeaveRoomMsg>(
            data,
        )?)),
        MessageType::SetReady => Ok(ClientMessage::SetReady(decode_payload::<SetReadyMsg>(
            data,
        )?)),
        MessageType::StartGame => Ok(ClientMessage::StartGame(decode_payload::<StartGameMsg>(
            data,
        )?)),
        MessageType::SubmitProof => Ok(ClientMessage::SubmitProof(decode_payload::<
            SubmitProofMsg,
        >(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    match decode_message_type(data)? {
        MessageType::Identified => Ok(ServerMessage::Identified(decode_payload::<
            IdentifiedMsg,
        >(data)?)),
        MessageType::Error => Ok(ServerMessage::Error(decode_payload::<ErrorMsg>(data)?)),
        MessageType::RoomCreated => Ok(ServerMessage::RoomCreated(decode_payload::<
            RoomCreatedMsg,
        >(data)?)),
        MessageType::RoomJoined => Ok(ServerMessage::RoomJoined(decode_payload::<
            RoomJoinedMsg,
        >(data)?)),
        MessageType::PlayerJoined => Ok(ServerMessage::PlayerJoined(decode_payload::<
            PlayerJoinedMsg,
        >(data)?)),
        MessageType::PlayerLeft => Ok(ServerMessage::PlayerLeft(decode_payload::<
            PlayerLeftMsg,
        >(data)?)),
        MessageType::ReadyUpdate => Ok(ServerMessage::ReadyUpdate(decode_payload::<
            ReadyUpdateMsg,
        >(data)?)),
        MessageType::GameStarted => Ok(ServerMessage::GameStarted(decode_payload::<
            GameStartedMsg,
        >(data)?)),
        MessageType::StateUpdate => Ok(ServerMessage::StateUpdate(decode_payload::<
            StateUpdateMsg,
        >(data)?)),
        MessageType::ProofResult => Ok(ServerMessage::ProofResult(decode_payload::<
            ProofResultMsg,
        >(data)?)),
        MessageType::GameEnded => Ok(ServerMessage::GameEnded(decode_payload::<GameEndedMsg>(
            data,
        )?)),
        MessageType::RoomsList => Ok(ServerMessage::RoomsList(decode_payload::<RoomsListMsg>(
            data,
        )?)),
        MessageType::RoomsUpdated => Ok(ServerMessage::RoomsUpdated(decode_payload::<
            RoomsUpdatedMsg,
        >(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}
