// Connection registry: maps player ids to their live WebSocket session.
// At most one session per player; a new connection replaces the old one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

/// A live player connection. The sender feeds the socket's outbound
/// writer task; `conn_id` distinguishes this connection from any
/// earlier one the same player opened.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub conn_id: Uuid,
    pub tx: mpsc::UnboundedSender<String>,
}

/// Thread-safe registry of connected players.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<i64, PlayerSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a player, replacing any previous one.
    /// Returns the id of the new connection.
    pub fn register(&self, player_id: i64, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let conn_id = Uuid::new_v4();
        let mut sessions = self.inner.lock().unwrap();
        sessions.insert(player_id, PlayerSession { conn_id, tx });
        conn_id
    }

    /// Remove a player's session, but only if it is still the given
    /// connection. A socket closing after being replaced by a newer
    /// connection must not tear down the newer one.
    pub fn unregister(&self, player_id: i64, conn_id: Uuid) -> bool {
        let mut sessions = self.inner.lock().unwrap();
        match sessions.get(&player_id) {
            Some(s) if s.conn_id == conn_id => {
                sessions.remove(&player_id);
                true
            }
            _ => false,
        }
    }

    /// Send a message to a player if they are connected. Fire-and-forget:
    /// a closed channel or absent session is not an error.
    pub fn notify(&self, player_id: i64, message: String) {
        let sessions = self.inner.lock().unwrap();
        if let Some(session) = sessions.get(&player_id) {
            let _ = session.tx.send(message);
        }
    }

    pub fn is_connected(&self, player_id: i64) -> bool {
        let sessions = self.inner.lock().unwrap();
        sessions.contains_key(&player_id)
    }

    pub fn connected_count(&self) -> usize {
        let sessions = self.inner.lock().unwrap();
        sessions.len()
    }
}
