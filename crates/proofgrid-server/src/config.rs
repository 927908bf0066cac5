use std::time::Duration;

use serde::Deserialize;

use proofgrid_core::catalog::DEFAULT_GRID_SIZE;
use proofgrid_core::challenge::DEFAULT_BATCH_SIZE;
use proofgrid_core::room::{GameMode, ProofPolicy, RoomSettings, StartPolicy};

/// Top-level server configuration, loaded from `proofgrid.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub auth: AuthFileConfig,
    pub limits: LimitsConfig,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            auth: AuthFileConfig::default(),
            limits: LimitsConfig::default(),
            game: GameConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub ws_rate_limit_per_sec: f64,
    pub player_message_buffer: usize,
    pub lobby_broadcast_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 500,
            ws_rate_limit_per_sec: 20.0,
            player_message_buffer: 256,
            lobby_broadcast_capacity: 256,
        }
    }
}

/// Gameplay knobs applied to every room this server creates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub grid_size: usize,
    pub challenge_batch_size: usize,
    pub tick_interval_ms: u64,
    pub refresh_interval_secs: u64,
    pub min_duration_minutes: u32,
    pub max_duration_minutes: u32,
    /// Upper bound on seats in a Swarm room.
    pub max_players_cap: usize,
    pub proof_policy: ProofPolicy,
    pub start_policy: StartPolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            challenge_batch_size: DEFAULT_BATCH_SIZE,
            tick_interval_ms: 1000,
            refresh_interval_secs: 15,
            min_duration_minutes: 1,
            max_duration_minutes: 30,
            max_players_cap: 16,
            proof_policy: ProofPolicy::PerPlayer,
            start_policy: StartPolicy::Host,
        }
    }
}

impl GameConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Settings for a new room, with the creator's request clamped to
    /// what this server allows.
    pub fn room_settings(
        &self,
        mode: GameMode,
        duration_minutes: u32,
        max_players: u32,
    ) -> RoomSettings {
        let minutes = duration_minutes.clamp(self.min_duration_minutes, self.max_duration_minutes);
        let seats = mode.clamp_seats(max_players as usize, self.max_players_cap);
        RoomSettings {
            grid_size: self.grid_size,
            batch_size: self.challenge_batch_size,
            proof_policy: self.proof_policy,
            start_policy: self.start_policy,
            ..RoomSettings::new(mode, Duration::from_secs(u64::from(minutes) * 60), seats)
        }
    }
}

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    /// Guards `/api/v1`. Open when unset.
    pub bearer_token: Option<String>,
    /// Key the identity service signs display names with. Identify tokens
    /// are not checked when unset.
    pub session_secret: Option<String>,
}

fn parse_proof_policy(s: &str) -> Option<ProofPolicy> {
    match s {
        "per_player" => Some(ProofPolicy::PerPlayer),
        "consume" => Some(ProofPolicy::Consume),
        _ => None,
    }
}

fn parse_start_policy(s: &str) -> Option<StartPolicy> {
    match s {
        "host" => Some(StartPolicy::Host),
        "auto" => Some(StartPolicy::Auto),
        _ => None,
    }
}

impl ServerConfig {
    /// Collect fatal configuration problems. Empty means the config is usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!(
                "listen_addr {:?} is not a valid socket address",
                self.listen_addr
            ));
        }
        if self.limits.max_ws_connections == 0 {
            problems.push("limits.max_ws_connections must be > 0".into());
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            problems.push("limits.ws_rate_limit_per_sec must be > 0".into());
        }
        if self.limits.player_message_buffer == 0 {
            problems.push("limits.player_message_buffer must be > 0".into());
        }
        if self.limits.lobby_broadcast_capacity == 0 {
            problems.push("limits.lobby_broadcast_capacity must be > 0".into());
        }
        let game = &self.game;
        if game.grid_size < 4 {
            problems.push("game.grid_size must be >= 4 to fit every catalog shape".into());
        }
        if game.challenge_batch_size == 0 {
            problems.push("game.challenge_batch_size must be > 0".into());
        }
        if game.tick_interval_ms == 0 {
            problems.push("game.tick_interval_ms must be > 0".into());
        }
        if game.refresh_interval_secs == 0 {
            problems.push("game.refresh_interval_secs must be > 0".into());
        }
        if game.min_duration_minutes == 0 || game.min_duration_minutes > game.max_duration_minutes
        {
            problems.push(
                "game.min_duration_minutes must be > 0 and <= game.max_duration_minutes".into(),
            );
        }
        if game.max_players_cap < 3 {
            problems.push("game.max_players_cap must be >= 3".into());
        }
        problems
    }

    /// Validate configuration, exiting on fatal problems and warning on
    /// risky ones.
    pub fn validate(&self) {
        let problems = self.problems();
        if !problems.is_empty() {
            for p in &problems {
                tracing::error!("{p}");
            }
            std::process::exit(1);
        }

        if self.auth.bearer_token.is_some() {
            tracing::warn!(
                "bearer_token is set in config file; use PROOFGRID_API_TOKEN env var in production"
            );
        }
        if self.auth.session_secret.is_none() {
            tracing::warn!("No session_secret configured; identify tokens are not verified");
        }
    }

    /// Load config from `proofgrid.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let config = match std::fs::read_to_string("proofgrid.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from proofgrid.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse proofgrid.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No proofgrid.toml found, using defaults");
                ServerConfig::default()
            },
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `PROOFGRID_*` overrides read through `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(addr) = var("PROOFGRID_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(token) = var("PROOFGRID_API_TOKEN") {
            self.auth.bearer_token = Some(token);
        }
        if let Some(secret) = var("PROOFGRID_SESSION_SECRET") {
            self.auth.session_secret = Some(secret);
        }
        if let Some(n) = var("PROOFGRID_MAX_WS_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.limits.max_ws_connections = n;
        }
        if let Some(n) = var("PROOFGRID_WS_RATE_LIMIT").and_then(|v| v.parse().ok()) {
            self.limits.ws_rate_limit_per_sec = n;
        }
        if let Some(val) = var("PROOFGRID_PROOF_POLICY") {
            match parse_proof_policy(&val) {
                Some(p) => self.game.proof_policy = p,
                None => tracing::warn!(value = %val, "Ignoring unknown PROOFGRID_PROOF_POLICY"),
            }
        }
        if let Some(val) = var("PROOFGRID_START_POLICY") {
            match parse_start_policy(&val) {
                Some(p) => self.game.start_policy = p,
                None => tracing::warn!(value = %val, "Ignoring unknown PROOFGRID_START_POLICY"),
            }
        }
        self
    }
}
