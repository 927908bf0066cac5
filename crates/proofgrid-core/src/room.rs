use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_GRID_SIZE;
use crate::challenge::{Challenge, ChallengeSet, DEFAULT_BATCH_SIZE};
use crate::player::{LeaderboardEntry, PROOF_PENALTY, PROOF_REWARD, PlayerId, PlayerSession};
use crate::verify::proof_matches;

/// Competitive format of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    /// Exactly two players.
    #[serde(alias = "duel", alias = "vs")]
    Duel,
    /// Three or more players.
    #[serde(alias = "swarm", alias = "multiprover")]
    Swarm,
}

impl GameMode {
    /// Fewest players the mode can start with.
    pub fn min_players(self) -> usize {
        match self {
            Self::Duel => 2,
            Self::Swarm => 3,
        }
    }

    /// Whether a game may start with `count` players seated.
    pub fn can_start_with(self, count: usize) -> bool {
        match self {
            Self::Duel => count == 2,
            Self::Swarm => count >= 3,
        }
    }

    /// Seat count for a room of this mode given what the creator asked for
    /// and the server-wide cap.
    pub fn clamp_seats(self, requested: usize, cap: usize) -> usize {
        match self {
            Self::Duel => 2,
            Self::Swarm => requested.clamp(3, cap.max(3)),
        }
    }

    /// Parse a mode name. Accepts the legacy `vs`/`multiprover` names.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "duel" | "vs" => Some(Self::Duel),
            "swarm" | "multiprover" => Some(Self::Swarm),
            _ => None,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duel => write!(f, "duel"),
            Self::Swarm => write!(f, "swarm"),
        }
    }
}

/// What happens to a challenge once somebody proves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofPolicy {
    /// The challenge stays on the board; each player may prove it once.
    #[default]
    PerPlayer,
    /// The first prover takes it off the board and a replacement is drawn.
    Consume,
}

/// How a Waiting room becomes Active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// The host sends an explicit start once everyone is ready.
    #[default]
    Host,
    /// The room starts itself as soon as it is startable. Host start still works.
    Auto,
}

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Waiting,
    Active,
    Finished,
    Empty,
}

/// Per-room knobs fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    pub mode: GameMode,
    pub duration: Duration,
    pub max_players: usize,
    pub grid_size: usize,
    pub batch_size: usize,
    pub proof_policy: ProofPolicy,
    pub start_policy: StartPolicy,
}

impl RoomSettings {
    pub fn new(mode: GameMode, duration: Duration, max_players: usize) -> Self {
        Self {
            mode,
            duration,
            max_players,
            grid_size: DEFAULT_GRID_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            proof_policy: ProofPolicy::default(),
            start_policy: StartPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), RoomError> {
        if self.duration.is_zero() {
            return Err(RoomError::InvalidSettings("duration must be > 0".into()));
        }
        if self.grid_size == 0 {
            return Err(RoomError::InvalidSettings("grid size must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(RoomError::InvalidSettings("batch size must be > 0".into()));
        }
        let seats_ok = match self.mode {
            GameMode::Duel => self.max_players == 2,
            GameMode::Swarm => self.max_players >= 3,
        };
        if !seats_ok {
            return Err(RoomError::InvalidSettings(format!(
                "{} rooms cannot seat {} players",
                self.mode, self.max_players
            )));
        }
        Ok(())
    }
}

/// Reasons a room operation is refused. Room state is unchanged whenever
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    RoomNotFound,
    InvalidRoomId,
    AlreadyInRoom,
    NotInRoom,
    InvalidSettings(String),
    NotWaiting,
    NotActive,
    RoomFull,
    DuplicateName(String),
    PlayerNotFound,
    NotHost,
    WrongPlayerCount { mode: GameMode, present: usize },
    PlayersNotReady,
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomNotFound => write!(f, "Room not found"),
            Self::InvalidRoomId => write!(f, "Invalid room id"),
            Self::AlreadyInRoom => write!(f, "Already in a room"),
            Self::NotInRoom => write!(f, "Not in a room"),
            Self::InvalidSettings(m) => write!(f, "Invalid room settings: {m}"),
            Self::NotWaiting => write!(f, "Room is not waiting for players"),
            Self::NotActive => write!(f, "Game not active"),
            Self::RoomFull => write!(f, "Room is full"),
            Self::DuplicateName(n) => write!(f, "{n} is already in this room"),
            Self::PlayerNotFound => write!(f, "Player not in room"),
            Self::NotHost => write!(f, "Only the host can start the game"),
            Self::WrongPlayerCount { mode, present } => match mode {
                GameMode::Duel => {
                    write!(f, "Duel requires exactly 2 players to start ({present} present)")
                },
                GameMode::Swarm => {
                    write!(f, "Swarm requires at least 3 players to start ({present} present)")
                },
            },
            Self::PlayersNotReady => write!(f, "Not all players are ready"),
        }
    }
}

impl std::error::Error for RoomError {}

/// Result of one proof submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOutcome {
    pub correct: bool,
    pub challenge_id: Option<String>,
    pub message: String,
    pub score: u32,
}

/// What a removal did to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub display_name: String,
    /// Set when the leaving player was host and somebody inherited the role.
    pub new_host: Option<(PlayerId, String)>,
    /// The room has no players left and is now `Empty`.
    pub emptied: bool,
    /// An Active Duel lost a participant and must be ended.
    pub below_minimum: bool,
}

/// Lobby-facing snapshot of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: String,
    pub host_name: Option<String>,
    pub mode: GameMode,
    pub duration_secs: u64,
    pub player_count: usize,
    pub max_players: usize,
    pub state: RoomState,
    pub remaining_secs: u64,
    pub all_ready: bool,
}

/// A single game session. Owns its players and challenges; nothing outside
/// mutates them except through these methods.
#[derive(Debug)]
pub struct Room {
    id: String,
    settings: RoomSettings,
    host_id: Option<PlayerId>,
    state: RoomState,
    started_at: Option<Instant>,
    ends_at: Option<Instant>,
    challenges: ChallengeSet,
    /// Join order. Host migration and leaderboard ties follow it.
    players: Vec<PlayerSession>,
}

impl Room {
    /// Create a Waiting room with its creator seated as host.
    pub fn new(
        id: impl Into<String>,
        settings: RoomSettings,
        host_id: PlayerId,
        host_name: impl Into<String>,
    ) -> Result<Self, RoomError> {
        settings.validate()?;
        let challenges = ChallengeSet::new(settings.batch_size);
        Ok(Self {
            id: id.into(),
            settings,
            host_id: Some(host_id),
            state: RoomState::Waiting,
            started_at: None,
            ends_at: None,
            challenges,
            players: vec![PlayerSession::new(host_id, host_name)],
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn mode(&self) -> GameMode {
        self.settings.mode
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn host_id(&self) -> Option<PlayerId> {
        self.host_id
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn ends_at(&self) -> Option<Instant> {
        self.ends_at
    }

    pub fn players(&self) -> &[PlayerSession] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerSession> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn active_challenges(&self) -> &[Challenge] {
        self.challenges.active()
    }

    /// Finished and Empty rooms are never reused.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RoomState::Finished | RoomState::Empty)
    }

    fn host_name(&self) -> Option<String> {
        self.host_id
            .and_then(|id| self.player(id))
            .map(|p| p.display_name.clone())
    }

    /// Seat a new player. Only Waiting rooms with a free seat accept joins,
    /// and display names are unique within a room.
    pub fn add_player(&mut self, id: PlayerId, display_name: &str) -> Result<(), RoomError> {
        if self.state != RoomState::Waiting {
            return Err(RoomError::NotWaiting);
        }
        if self.players.len() >= self.settings.max_players {
            return Err(RoomError::RoomFull);
        }
        if self.players.iter().any(|p| p.display_name == display_name) {
            return Err(RoomError::DuplicateName(display_name.to_string()));
        }
        if self.players.iter().any(|p| p.id == id) {
            return Err(RoomError::AlreadyInRoom);
        }
        self.players.push(PlayerSession::new(id, display_name));
        Ok(())
    }

    /// Remove a player, migrating the host role and draining the room to
    /// `Empty` when the last player goes.
    pub fn remove_player(&mut self, id: PlayerId) -> Result<Departure, RoomError> {
        let pos = self
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or(RoomError::PlayerNotFound)?;
        let leaving = self.players.remove(pos);

        if self.players.is_empty() {
            self.host_id = None;
            if matches!(self.state, RoomState::Waiting | RoomState::Active) {
                self.state = RoomState::Empty;
            }
            return Ok(Departure {
                display_name: leaving.display_name,
                new_host: None,
                emptied: true,
                below_minimum: false,
            });
        }

        let mut new_host = None;
        if self.host_id == Some(id) {
            let heir = &self.players[0];
            self.host_id = Some(heir.id);
            new_host = Some((heir.id, heir.display_name.clone()));
        }

        let below_minimum = self.state == RoomState::Active
            && self.settings.mode == GameMode::Duel
            && self.players.len() < GameMode::Duel.min_players();

        Ok(Departure {
            display_name: leaving.display_name,
            new_host,
            emptied: false,
            below_minimum,
        })
    }

    /// Toggle a player's ready flag. Returns whether the room is now
    /// startable.
    pub fn set_ready(&mut self, id: PlayerId, ready: bool) -> Result<bool, RoomError> {
        if self.state != RoomState::Waiting {
            return Err(RoomError::NotWaiting);
        }
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RoomError::PlayerNotFound)?;
        player.ready = ready;
        Ok(self.check_startable().is_ok())
    }

    /// True when every seated player is ready.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.ready)
    }

    /// Player-count and readiness gate shared by host and auto start.
    pub fn check_startable(&self) -> Result<(), RoomError> {
        if self.state != RoomState::Waiting {
            return Err(RoomError::NotWaiting);
        }
        if !self.settings.mode.can_start_with(self.players.len()) {
            return Err(RoomError::WrongPlayerCount {
                mode: self.settings.mode,
                present: self.players.len(),
            });
        }
        if !self.all_ready() {
            return Err(RoomError::PlayersNotReady);
        }
        Ok(())
    }

    /// Host-initiated start.
    pub fn start(&mut self, requester: PlayerId, now: Instant) -> Result<(), RoomError> {
        if self.state != RoomState::Waiting {
            return Err(RoomError::NotWaiting);
        }
        if self.host_id != Some(requester) {
            return Err(RoomError::NotHost);
        }
        self.check_startable()?;
        self.begin(now, &mut rand::rng());
        Ok(())
    }

    /// Start without a host request when the room runs the auto policy and
    /// is startable. Returns whether the room went Active.
    pub fn try_auto_start(&mut self, now: Instant) -> bool {
        if self.settings.start_policy != StartPolicy::Auto || self.check_startable().is_err() {
            return false;
        }
        self.begin(now, &mut rand::rng());
        true
    }

    fn begin<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) {
        self.state = RoomState::Active;
        self.started_at = Some(now);
        self.ends_at = Some(now + self.settings.duration);
        self.challenges.refresh_all_with(rng);
    }

    /// Check a selection against the board and score it.
    pub fn submit_proof(
        &mut self,
        player_id: PlayerId,
        selected: &[u32],
        now: Instant,
    ) -> Result<ProofOutcome, RoomError> {
        if self.state != RoomState::Active {
            return Err(RoomError::NotActive);
        }
        let idx = self
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(RoomError::PlayerNotFound)?;

        let grid = self.settings.grid_size;
        let proved = &self.players[idx].proved_challenge_ids;
        let matched = self
            .challenges
            .active()
            .iter()
            .find(|c| !proved.contains(&c.id) && proof_matches(selected, &c.cells, grid))
            .map(|c| (c.id.clone(), c.name.clone()));

        let player = &mut self.players[idx];
        let Some((challenge_id, name)) = matched else {
            player.record_wrong(now);
            return Ok(ProofOutcome {
                correct: false,
                challenge_id: None,
                message: format!("Incorrect proof. -{PROOF_PENALTY} points!"),
                score: player.score,
            });
        };

        player.record_correct(now);
        match self.settings.proof_policy {
            ProofPolicy::PerPlayer => {
                player.proved_challenge_ids.insert(challenge_id.clone());
            },
            ProofPolicy::Consume => {
                self.challenges.consume(&challenge_id);
            },
        }
        Ok(ProofOutcome {
            correct: true,
            challenge_id: Some(challenge_id),
            message: format!("Proof of {name} successful! +{PROOF_REWARD} points!"),
            score: player.score,
        })
    }

    /// Swap the whole board for a new batch. No-op unless Active.
    pub fn refresh_challenges(&mut self) -> bool {
        if self.state != RoomState::Active {
            return false;
        }
        self.challenges.refresh_all();
        true
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.state == RoomState::Active && self.ends_at.is_some_and(|end| now >= end)
    }

    /// Whole seconds left, rounded up. The full duration before start.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        match self.ends_at {
            None => self.settings.duration.as_secs(),
            Some(end) => {
                let left = end.saturating_duration_since(now);
                left.as_secs() + u64::from(left.subsec_nanos() > 0)
            },
        }
    }

    /// Move an Active room to Finished and hand back the final standings.
    /// Returns `None` on every call after the first, so results are
    /// published and persisted once.
    pub fn finish_game(&mut self) -> Option<Vec<LeaderboardEntry>> {
        if self.state != RoomState::Active {
            return None;
        }
        self.state = RoomState::Finished;
        Some(self.leaderboard())
    }

    /// Standings by score, ties kept in join order.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut board: Vec<LeaderboardEntry> = self
            .players
            .iter()
            .map(|p| LeaderboardEntry {
                player_id: p.id,
                display_name: p.display_name.clone(),
                score: p.score,
                correct_count: p.correct_count,
                wrong_count: p.wrong_count,
                is_host: self.host_id == Some(p.id),
                ready: p.ready,
            })
            .collect();
        board.sort_by(|a, b| b.score.cmp(&a.score));
        board
    }

    pub fn info(&self, now: Instant) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            host_name: self.host_name(),
            mode: self.settings.mode,
            duration_secs: self.settings.duration.as_secs(),
            player_count: self.players.len(),
            max_players: self.settings.max_players,
            state: self.state,
            remaining_secs: self.remaining_secs(now),
            all_ready: self.all_ready(),
        }
    }
}

/// Generate a room code in `ABCD-1234` form.
pub fn generate_room_code() -> String {
    generate_room_code_with(&mut rand::rng())
}

pub fn generate_room_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let letters: String = (0..4)
        .map(|_| char::from(b'A' + rng.random_range(0..26u8)))
        .collect();
    let digits: u16 = rng.random_range(0..10_000);
    format!("{letters}-{digits:04}")
}

/// Cheap shape check on client-supplied room ids before a registry lookup.
pub fn is_valid_room_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 9
        && bytes[..4].iter().all(u8::is_ascii_uppercase)
        && bytes[4] == b'-'
        && bytes[5..].iter().all(u8::is_ascii_digit)
}
