use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{CATALOG, Cell, ShapeDef};

/// Default number of challenges live in a room at once.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// One drawn instance of a catalog shape. The id is fresh per draw, so the
/// same shape drawn twice yields two distinct challenges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Challenge {
    fn from_shape(shape: &ShapeDef) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: shape.name.to_string(),
            cells: shape.cells.to_vec(),
        }
    }
}

/// Draw `n` challenges without repeating a shape until the catalog has been
/// used up, then refill from the full catalog and keep going.
pub fn draw_batch<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<Challenge> {
    let mut pool: Vec<&ShapeDef> = Vec::new();
    let mut batch = Vec::with_capacity(n);
    for _ in 0..n {
        if pool.is_empty() {
            pool.extend(CATALOG.iter());
        }
        let idx = rng.random_range(0..pool.len());
        batch.push(Challenge::from_shape(pool.swap_remove(idx)));
    }
    batch
}

/// The active challenge bag of one room.
#[derive(Debug, Clone)]
pub struct ChallengeSet {
    batch_size: usize,
    active: Vec<Challenge>,
}

impl ChallengeSet {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            active: Vec::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn active(&self) -> &[Challenge] {
        &self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Replace the whole active batch with a freshly drawn one.
    pub fn refresh_all(&mut self) {
        self.refresh_all_with(&mut rand::rng());
    }

    pub fn refresh_all_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.active = draw_batch(rng, self.batch_size);
    }

    /// Remove a proved challenge and draw one replacement, preferring a
    /// shape that is not already on the board. Returns the removed
    /// challenge, or `None` if the id is not active.
    pub fn consume(&mut self, id: &str) -> Option<Challenge> {
        self.consume_with(&mut rand::rng(), id)
    }

    pub fn consume_with<R: Rng + ?Sized>(&mut self, rng: &mut R, id: &str) -> Option<Challenge> {
        let pos = self.active.iter().position(|c| c.id == id)?;
        let removed = self.active.remove(pos);

        let unused: Vec<&ShapeDef> = CATALOG
            .iter()
            .filter(|s| !self.active.iter().any(|c| c.name == s.name))
            .collect();
        let replacement = if unused.is_empty() {
            draw_batch(rng, 1).pop()
        } else {
            Some(Challenge::from_shape(unused[rng.random_range(0..unused.len())]))
        };
        if let Some(next) = replacement {
            self.active.push(next);
        }
        Some(removed)
    }
}
