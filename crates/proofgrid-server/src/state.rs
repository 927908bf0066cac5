use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use proofgrid_core::profile::{MemoryProfileStore, ProfileStore};

use crate::auth::AuthConfig;
use crate::config::ServerConfig;
use crate::lobby::LobbyNotifier;
use crate::room_registry::RoomRegistry;

pub type SharedRoomRegistry = Arc<RwLock<RoomRegistry>>;

#[derive(Clone)]
pub struct AppState {
    pub rooms: SharedRoomRegistry,
    pub lobby: LobbyNotifier,
    pub profiles: Arc<dyn ProfileStore>,
    pub auth: AuthConfig,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_profiles(config, Arc::new(MemoryProfileStore::new()))
    }

    pub fn with_profiles(config: ServerConfig, profiles: Arc<dyn ProfileStore>) -> Self {
        let auth = AuthConfig {
            bearer_token: config.auth.bearer_token.clone(),
            session_secret: config.auth.session_secret.clone(),
        };
        Self {
            rooms: Arc::new(RwLock::new(RoomRegistry::new())),
            lobby: LobbyNotifier::new(config.limits.lobby_broadcast_capacity),
            profiles,
            auth,
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts a live WebSocket for as long as it is held.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_tracks_connections() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = ConnectionGuard::new(Arc::clone(&counter));
        let b = ConnectionGuard::new(Arc::clone(&counter));
        assert_eq!(counter.load(Ordering::Relaxed), 2);
        drop(a);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(b);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
