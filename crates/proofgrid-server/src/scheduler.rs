use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::room_loop::RoomCommand;

/// The two recurring timers of an Active room. They only post commands
/// into the room's queue; the room decides what a tick means.
pub struct RoomTimers {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RoomTimers {
    /// Start the countdown tick and the challenge refresh. The first of
    /// each fires one full period after start.
    pub fn start(
        tx: mpsc::UnboundedSender<RoomCommand>,
        tick_every: Duration,
        refresh_every: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tasks = vec![
            spawn_interval(cancel.clone(), tick_every, tx.clone(), || RoomCommand::Tick),
            spawn_interval(cancel.clone(), refresh_every, tx, || RoomCommand::Refresh),
        ];
        Self { cancel, tasks }
    }

    /// Stop both timers. Consumes the handle so it cannot run twice.
    pub fn cancel(self) {
        self.cancel.cancel();
    }

    /// True once every timer task has returned.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}

impl Drop for RoomTimers {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_interval(
    cancel: CancellationToken,
    period: Duration,
    tx: mpsc::UnboundedSender<RoomCommand>,
    make: fn() -> RoomCommand,
) -> JoinHandle<()> {
    // Anchored to the moment the room went Active, not to the first poll.
    let start = tokio::time::Instant::now() + period;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if tx.send(make()).is_err() {
                        // Room loop is gone
                        break;
                    }
                }
            }
        }
    })
}
