use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use proofgrid_core::player::PlayerId;
use proofgrid_core::room::{RoomInfo, RoomState, generate_room_code};

use crate::room_loop::RoomCommand;

/// Per-player sender for outbound WebSocket binary messages. Bounded by
/// `limits.player_message_buffer` so a slow client cannot grow memory.
pub type PlayerSender = mpsc::Sender<Bytes>;

/// What the registry keeps for a live room: a way to reach its loop and
/// the last snapshot it published.
#[derive(Clone)]
pub struct RoomHandle {
    pub commands: mpsc::UnboundedSender<RoomCommand>,
    pub summary: watch::Receiver<RoomInfo>,
}

/// Index of live rooms and the player id allocator. Room state itself lives
/// in each room's loop; this only hands out the way to reach it.
pub struct RoomRegistry {
    rooms: HashMap<String, RoomHandle>,
    next_player_id: PlayerId,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            next_player_id: 1,
        }
    }

    pub fn alloc_player_id(&mut self) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        id
    }

    /// A fresh room code, retrying on collision with existing rooms.
    pub fn unique_code(&self) -> String {
        loop {
            let code = generate_room_code();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn insert(&mut self, code: String, handle: RoomHandle) {
        self.rooms.insert(code, handle);
    }

    pub fn get(&self, code: &str) -> Option<&RoomHandle> {
        self.rooms.get(code)
    }

    pub fn remove(&mut self, code: &str) -> bool {
        self.rooms.remove(code).is_some()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Rooms a player could join right now, ordered by code.
    pub fn waiting_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self
            .rooms
            .values()
            .map(|h| h.summary.borrow().clone())
            .filter(|info| info.state == RoomState::Waiting)
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    /// `(rooms, seated players)` across every live room.
    pub fn stats(&self) -> (usize, usize) {
        let players = self
            .rooms
            .values()
            .map(|h| h.summary.borrow().player_count)
            .sum();
        (self.rooms.len(), players)
    }
}
