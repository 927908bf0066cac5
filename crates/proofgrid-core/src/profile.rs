use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One row of the all-time leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileScore {
    pub display_name: String,
    pub high_score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// The backing store could not be reached or is in a broken state.
    Unavailable(String),
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "profile store unavailable: {e}"),
        }
    }
}

impl std::error::Error for ProfileError {}

/// Persistent per-player high scores. Calls may block; async callers run
/// them on a blocking worker.
pub trait ProfileStore: Send + Sync {
    /// All-time-high score, or `None` for a player never recorded.
    fn high_score(&self, display_name: &str) -> Result<Option<u32>, ProfileError>;

    /// Store `score` if it beats the current high. Returns whether it did.
    fn record_if_higher(&self, display_name: &str, score: u32) -> Result<bool, ProfileError>;

    /// Best `limit` profiles, highest first, ties by name.
    fn top(&self, limit: usize) -> Result<Vec<ProfileScore>, ProfileError>;
}

/// Process-local store used by the server binary and tests.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    scores: Mutex<HashMap<String, u32>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, u32>>, ProfileError> {
        self.scores
            .lock()
            .map_err(|e| ProfileError::Unavailable(e.to_string()))
    }
}

impl ProfileStore for MemoryProfileStore {
    fn high_score(&self, display_name: &str) -> Result<Option<u32>, ProfileError> {
        Ok(self.lock()?.get(display_name).copied())
    }

    fn record_if_higher(&self, display_name: &str, score: u32) -> Result<bool, ProfileError> {
        let mut scores = self.lock()?;
        match scores.get_mut(display_name) {
            Some(best) if *best >= score => Ok(false),
            Some(best) => {
                *best = score;
                Ok(true)
            },
            None => {
                scores.insert(display_name.to_string(), score);
                Ok(true)
            },
        }
    }

    fn top(&self, limit: usize) -> Result<Vec<ProfileScore>, ProfileError> {
        let scores = self.lock()?;
        let mut rows: Vec<ProfileScore> = scores
            .iter()
            .map(|(name, &score)| ProfileScore {
                display_name: name.clone(),
                high_score: score,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.high_score
                .cmp(&a.high_score)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        rows.truncate(limit);
        Ok(rows)
    }
}
