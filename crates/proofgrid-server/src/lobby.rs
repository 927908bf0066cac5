use bytes::Bytes;
use tokio::sync::broadcast;

use proofgrid_core::net::messages::{RoomsUpdatedMsg, ServerMessage};
use proofgrid_core::net::protocol::encode_server_message;

/// Process-wide fan-out of the `RoomsUpdated` hint. Every socket writer
/// holds a receiver; rooms call [`LobbyNotifier::notify`] on any change a
/// lobby listing would show.
#[derive(Clone)]
pub struct LobbyNotifier {
    tx: broadcast::Sender<Bytes>,
    frame: Bytes,
}

impl LobbyNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let frame = match encode_server_message(&ServerMessage::RoomsUpdated(RoomsUpdatedMsg {})) {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode RoomsUpdated");
                Bytes::new()
            },
        };
        Self { tx, frame }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    pub fn notify(&self) {
        if self.frame.is_empty() {
            return;
        }
        // No subscribers just means nobody is connected
        let _ = self.tx.send(self.frame.clone());
    }
}
