pub mod catalog;
pub mod challenge;
pub mod net;
pub mod player;
pub mod profile;
pub mod room;
pub mod verify;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::time::Duration;

    use crate::catalog::Cell;
    use crate::player::PlayerId;
    use crate::room::{GameMode, Room, RoomSettings};
    use crate::verify::cell_index;

    /// Display names handed out by [`seated_room`], in join order.
    pub const NAMES: &[&str] = &["Alice", "Bob", "Carol", "Dave", "Erin", "Frank"];

    /// A Waiting room with `n` players (ids 1..=n) seated; player 1 is host.
    pub fn seated_room(mode: GameMode, n: usize, duration_secs: u64) -> Room {
        let seats = mode.clamp_seats(n.max(3), NAMES.len());
        let settings = RoomSettings::new(mode, Duration::from_secs(duration_secs), seats);
        let mut room = Room::new("TEST-0001", settings, 1, NAMES[0]).unwrap();
        for i in 1..n {
            room.add_player(i as PlayerId + 1, NAMES[i]).unwrap();
        }
        room
    }

    /// Same as [`seated_room`] with every player ready.
    pub fn ready_room(mode: GameMode, n: usize, duration_secs: u64) -> Room {
        let mut room = seated_room(mode, n, duration_secs);
        for id in 1..=n as PlayerId {
            room.set_ready(id, true).unwrap();
        }
        room
    }

    /// Flat indices that prove `cells` when placed with its origin at
    /// `(row, col)`.
    pub fn solve_at(cells: &[Cell], row: usize, col: usize, grid_size: usize) -> Vec<u32> {
        cells
            .iter()
            .map(|&(r, c)| cell_index(row + r as usize, col + c as usize, grid_size))
            .collect()
    }

    /// A selection no 3- or 4-cell shape can match.
    pub fn wrong_selection() -> Vec<u32> {
        vec![0]
    }
}
