use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use proofgrid_core::net::messages::{
    EndReason, GameEndedMsg, GameStartedMsg, PlayerJoinedMsg, PlayerLeftMsg, ProofResultMsg,
    ReadyUpdateMsg, RoomCreatedMsg, RoomJoinedMsg, ServerMessage, StateUpdateMsg,
};
use proofgrid_core::net::protocol::encode_server_message;
use proofgrid_core::player::{LeaderboardEntry, PlayerId};
use proofgrid_core::profile::ProfileStore;
use proofgrid_core::room::{Room, RoomError, RoomInfo, RoomState};

use crate::lobby::LobbyNotifier;
use crate::room_registry::{PlayerSender, RoomHandle};
use crate::scheduler::RoomTimers;
use crate::state::{AppState, SharedRoomRegistry};

pub type Reply = oneshot::Sender<Result<(), RoomError>>;

/// Everything that can happen to a room, in the order it happened.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player_id: PlayerId,
        display_name: String,
        sender: PlayerSender,
        reply: Reply,
    },
    /// Explicit leave or disconnect. Acknowledged once the player is gone.
    Leave {
        player_id: PlayerId,
        ack: oneshot::Sender<()>,
    },
    SetReady {
        player_id: PlayerId,
        ready: bool,
        reply: Reply,
    },
    Start {
        player_id: PlayerId,
        reply: Reply,
    },
    SubmitProof {
        player_id: PlayerId,
        selected_cells: Vec<u32>,
        reply: Reply,
    },
    Tick,
    Refresh,
}

/// Shared services a room loop needs beyond its own state.
#[derive(Clone)]
pub struct RoomContext {
    pub registry: SharedRoomRegistry,
    pub lobby: LobbyNotifier,
    pub profiles: Arc<dyn ProfileStore>,
    pub tick_every: Duration,
    pub refresh_every: Duration,
}

impl RoomContext {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            registry: Arc::clone(&state.rooms),
            lobby: state.lobby.clone(),
            profiles: Arc::clone(&state.profiles),
            tick_every: state.config.game.tick_interval(),
            refresh_every: state.config.game.refresh_interval(),
        }
    }
}

/// Spawn the loop that owns `room`. The creator is already seated as host
/// and receives `RoomCreated` first.
pub fn spawn_room(room: Room, host: PlayerSender, ctx: RoomContext) -> (RoomHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (actor, summary) = RoomActor::new(room, host, tx.clone(), ctx);
    let task = tokio::spawn(actor.run(rx));
    (
        RoomHandle {
            commands: tx,
            summary,
        },
        task,
    )
}

/// Sole owner of one room. Commands are handled one at a time, so a proof,
/// a tick and a departure never interleave.
pub struct RoomActor {
    room: Room,
    senders: HashMap<PlayerId, PlayerSender>,
    timers: Option<RoomTimers>,
    commands: mpsc::UnboundedSender<RoomCommand>,
    summary: watch::Sender<RoomInfo>,
    ctx: RoomContext,
    persist_task: Option<JoinHandle<()>>,
}

impl RoomActor {
    fn new(
        room: Room,
        host: PlayerSender,
        commands: mpsc::UnboundedSender<RoomCommand>,
        ctx: RoomContext,
    ) -> (Self, watch::Receiver<RoomInfo>) {
        let (summary, summary_rx) = watch::channel(room.info(now()));
        let mut senders = HashMap::new();
        if let Some(host_id) = room.host_id() {
            senders.insert(host_id, host);
        }
        let actor = Self {
            room,
            senders,
            timers: None,
            commands,
            summary,
            ctx,
            persist_task: None,
        };
        (actor, summary_rx)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCommand>) {
        self.announce_created();
        while let Some(cmd) = rx.recv().await {
            let at = now();
            self.handle(cmd, at);
            self.summary.send_replace(self.room.info(at));
            if self.room.is_terminal() {
                break;
            }
        }
        // Close the queue first so sessions see the room as gone
        drop(rx);
        self.shutdown().await;
    }

    fn handle(&mut self, cmd: RoomCommand, now: Instant) {
        match cmd {
            RoomCommand::Join {
                player_id,
                display_name,
                sender,
                reply,
            } => {
                let result = self.join(player_id, &display_name, sender, now);
                let _ = reply.send(result);
            },
            RoomCommand::Leave { player_id, ack } => {
                self.leave(player_id);
                let _ = ack.send(());
            },
            RoomCommand::SetReady {
                player_id,
                ready,
                reply,
            } => {
                let _ = reply.send(self.set_ready(player_id, ready, now));
            },
            RoomCommand::Start { player_id, reply } => {
                let _ = reply.send(self.start(player_id, now));
            },
            RoomCommand::SubmitProof {
                player_id,
                selected_cells,
                reply,
            } => {
                let _ = reply.send(self.submit_proof(player_id, &selected_cells, now));
            },
            RoomCommand::Tick => self.on_tick(now),
            RoomCommand::Refresh => self.on_refresh(now),
        }
    }

    fn announce_created(&self) {
        let at = now();
        if let Some(host_id) = self.room.host_id() {
            self.send_to(
                host_id,
                &ServerMessage::RoomCreated(RoomCreatedMsg {
                    room: self.room.info(at),
                    players: self.room.leaderboard(),
                }),
            );
        }
        tracing::info!(
            room = %self.room.id(),
            mode = %self.room.mode(),
            max_players = self.room.settings().max_players,
            "Room created"
        );
        self.ctx.lobby.notify();
    }

    fn join(
        &mut self,
        player_id: PlayerId,
        display_name: &str,
        sender: PlayerSender,
        now: Instant,
    ) -> Result<(), RoomError> {
        self.room.add_player(player_id, display_name)?;
        self.senders.insert(player_id, sender);
        tracing::info!(room = %self.room.id(), player_id, name = display_name, "Player joined");

        let players = self.room.leaderboard();
        self.send_to(
            player_id,
            &ServerMessage::RoomJoined(RoomJoinedMsg {
                room: self.room.info(now),
                players: players.clone(),
            }),
        );
        self.fanout(
            &ServerMessage::PlayerJoined(PlayerJoinedMsg {
                player_id,
                display_name: display_name.to_string(),
                players,
            }),
            Some(player_id),
        );
        self.ctx.lobby.notify();
        Ok(())
    }

    fn leave(&mut self, player_id: PlayerId) {
        let Ok(departure) = self.room.remove_player(player_id) else {
            return;
        };
        tracing::info!(room = %self.room.id(), player_id, "Player left");
        if let Some((host_id, host_name)) = &departure.new_host {
            tracing::info!(room = %self.room.id(), new_host = host_id, name = %host_name, "Host migrated");
        }

        // The leaver's sender is still registered here, so it sees its own
        // departure as confirmation.
        self.fanout(
            &ServerMessage::PlayerLeft(PlayerLeftMsg {
                player_id,
                display_name: departure.display_name.clone(),
                new_host_id: departure.new_host.as_ref().map(|(id, _)| *id),
                players: self.room.leaderboard(),
            }),
            None,
        );
        self.senders.remove(&player_id);

        if departure.emptied {
            self.stop_timers();
            return;
        }
        if departure.below_minimum {
            let message = format!("{} left the game. Game Over.", departure.display_name);
            self.finish(EndReason::PlayerLeft, message);
        }
        self.ctx.lobby.notify();
    }

    fn set_ready(&mut self, player_id: PlayerId, ready: bool, now: Instant) -> Result<(), RoomError> {
        self.room.set_ready(player_id, ready)?;
        self.fanout(
            &ServerMessage::ReadyUpdate(ReadyUpdateMsg {
                player_id,
                ready,
                all_ready: self.room.all_ready(),
                players: self.room.leaderboard(),
            }),
            None,
        );
        if self.room.try_auto_start(now) {
            self.on_started(now);
        } else {
            self.ctx.lobby.notify();
        }
        Ok(())
    }

    fn start(&mut self, player_id: PlayerId, now: Instant) -> Result<(), RoomError> {
        self.room.start(player_id, now)?;
        self.on_started(now);
        Ok(())
    }

    fn on_started(&mut self, now: Instant) {
        self.timers = Some(RoomTimers::start(
            self.commands.clone(),
            self.ctx.tick_every,
            self.ctx.refresh_every,
        ));
        tracing::info!(
            room = %self.room.id(),
            players = self.room.player_count(),
            secs = self.room.settings().duration.as_secs(),
            "Game started"
        );
        self.fanout(
            &ServerMessage::GameStarted(GameStartedMsg {
                grid_size: self.room.settings().grid_size as u32,
                remaining_secs: self.room.remaining_secs(now),
                initial_challenges: self.room.active_challenges().to_vec(),
                leaderboard: self.room.leaderboard(),
            }),
            None,
        );
        self.ctx.lobby.notify();
    }

    fn submit_proof(
        &mut self,
        player_id: PlayerId,
        selected: &[u32],
        now: Instant,
    ) -> Result<(), RoomError> {
        let outcome = self.room.submit_proof(player_id, selected, now)?;
        tracing::debug!(
            room = %self.room.id(),
            player_id,
            correct = outcome.correct,
            score = outcome.score,
            "Proof checked"
        );
        self.send_to(
            player_id,
            &ServerMessage::ProofResult(ProofResultMsg {
                correct: outcome.correct,
                message: outcome.message,
                challenge_id: outcome.challenge_id,
                score: outcome.score,
            }),
        );
        self.broadcast_state(now);
        Ok(())
    }

    fn on_tick(&mut self, now: Instant) {
        if self.room.state() != RoomState::Active {
            tracing::debug!(room = %self.room.id(), "Tick outside Active ignored");
            return;
        }
        if self.room.is_expired(now) {
            self.finish(EndReason::TimeUp, "Time's up!".to_string());
        } else {
            self.broadcast_state(now);
        }
    }

    fn on_refresh(&mut self, now: Instant) {
        if self.room.refresh_challenges() {
            self.broadcast_state(now);
        }
    }

    /// Publish final results once and persist them. Later calls are no-ops.
    fn finish(&mut self, reason: EndReason, message: String) {
        let Some(results) = self.room.finish_game() else {
            return;
        };
        self.stop_timers();
        tracing::info!(room = %self.room.id(), ?reason, "Game ended");
        self.fanout(
            &ServerMessage::GameEnded(GameEndedMsg {
                reason,
                message,
                final_results: results.clone(),
            }),
            None,
        );
        self.persist(results);
    }

    fn persist(&mut self, results: Vec<LeaderboardEntry>) {
        let profiles = Arc::clone(&self.ctx.profiles);
        let room_id = self.room.id().to_string();
        self.persist_task = Some(tokio::task::spawn_blocking(move || {
            for entry in results {
                if let Err(e) = profiles.record_if_higher(&entry.display_name, entry.score) {
                    tracing::warn!(
                        room = %room_id,
                        player = %entry.display_name,
                        error = %e,
                        "Failed to record high score"
                    );
                }
            }
        }));
    }

    fn stop_timers(&mut self) {
        if let Some(timers) = self.timers.take() {
            timers.cancel();
            tracing::debug!(room = %self.room.id(), "Room timers cancelled");
        }
    }

    async fn shutdown(mut self) {
        self.stop_timers();
        let id = self.room.id().to_string();
        self.ctx.registry.write().await.remove(&id);
        self.ctx.lobby.notify();
        if let Some(task) = self.persist_task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(room = %id, error = %e, "Result persistence task failed");
        }
        tracing::info!(room = %id, state = ?self.room.state(), "Room closed");
    }

    fn broadcast_state(&self, now: Instant) {
        self.fanout(
            &ServerMessage::StateUpdate(StateUpdateMsg {
                remaining_secs: self.room.remaining_secs(now),
                leaderboard: self.room.leaderboard(),
                active_challenges: self.room.active_challenges().to_vec(),
            }),
            None,
        );
    }

    fn send_to(&self, player_id: PlayerId, msg: &ServerMessage) {
        let Some(tx) = self.senders.get(&player_id) else {
            return;
        };
        if let Some(data) = encode(msg)
            && let Err(e) = tx.try_send(data)
        {
            tracing::debug!(
                player_id, room = %self.room.id(), error = %e,
                "Failed to send to player (slow or disconnected)"
            );
        }
    }

    /// Send to every seated player, optionally skipping one.
    fn fanout(&self, msg: &ServerMessage, except: Option<PlayerId>) {
        let Some(data) = encode(msg) else {
            return;
        };
        for (&pid, tx) in &self.senders {
            if Some(pid) == except {
                continue;
            }
            if let Err(e) = tx.try_send(data.clone()) {
                tracing::debug!(
                    player_id = pid, room = %self.room.id(), error = %e,
                    "Skipping broadcast to slow client"
                );
            }
        }
    }
}

fn encode(msg: &ServerMessage) -> Option<Bytes> {
    match encode_server_message(msg) {
        Ok(data) => Some(Bytes::from(data)),
        Err(e) => {
            tracing::error!(msg_type = ?msg.message_type(), error = %e, "Failed to encode");
            None
        },
    }
}

/// Wall-clock reading that follows tokio's clock, so paused-time tests
/// drive room deadlines too.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
