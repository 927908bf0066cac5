use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Connection-scoped player identifier, allocated by the registry.
pub type PlayerId = u64;

/// Points awarded for a correct proof.
pub const PROOF_REWARD: u32 = 10;
/// Points deducted for a wrong proof (score floors at zero).
pub const PROOF_PENALTY: u32 = 5;

/// A player's membership in one room. Owned by that room.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub id: PlayerId,
    pub display_name: String,
    pub score: u32,
    pub ready: bool,
    pub proved_challenge_ids: HashSet<String>,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub last_proof_at: Option<Instant>,
}

impl PlayerSession {
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            score: 0,
            ready: false,
            proved_challenge_ids: HashSet::new(),
            correct_count: 0,
            wrong_count: 0,
            last_proof_at: None,
        }
    }

    pub(crate) fn record_correct(&mut self, now: Instant) {
        self.score = self.score.saturating_add(PROOF_REWARD);
        self.correct_count += 1;
        self.last_proof_at = Some(now);
    }

    pub(crate) fn record_wrong(&mut self, now: Instant) {
        self.score = self.score.saturating_sub(PROOF_PENALTY);
        self.wrong_count += 1;
        self.last_proof_at = Some(now);
    }
}

/// One row of a room leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub score: u32,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub is_host: bool,
    pub ready: bool,
}

/// Validate and normalize a display name. Returns `None` when the name is
/// empty after trimming, longer than 32 bytes, or contains control chars.
pub fn normalize_display_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.len() > 32 || name.chars().any(char::is_control) {
        return None;
    }
    Some(name.to_string())
}
