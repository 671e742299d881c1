// FIFO matchmaking queue. Players join while browsing, a background
// worker pairs the two oldest tickets and opens a battle for them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::battle::server::BattleServer;
use crate::metrics;
use crate::session::SessionRegistry;

/// A player waiting for an opponent.
#[derive(Debug, Clone)]
pub struct MatchTicket {
    pub player_id: i64,
    pub enqueued_at: DateTime<Utc>,
}

/// Status of the matchmaking queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub depth: usize,
}

/// Thread-safe FIFO matchmaking queue.
#[derive(Debug, Clone, Default)]
pub struct MatchQueue {
    inner: Arc<Mutex<VecDeque<MatchTicket>>>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player to the back of the queue. Idempotent: returns false
    /// if the player is already waiting.
    pub fn enqueue(&self, player_id: i64) -> bool {
        let mut queue = self.inner.lock().unwrap();
        if queue.iter().any(|t| t.player_id == player_id) {
            return false;
        }
        queue.push_back(MatchTicket {
            player_id,
            enqueued_at: Utc::now(),
        });
        metrics::MATCH_QUEUE_DEPTH.set(queue.len() as i64);
        true
    }

    /// Remove a player from the queue, wherever they are in it.
    pub fn remove(&self, player_id: i64) -> bool {
        let mut queue = self.inner.lock().unwrap();
        let before = queue.len();
        queue.retain(|t| t.player_id != player_id);
        metrics::MATCH_QUEUE_DEPTH.set(queue.len() as i64);
        queue.len() != before
    }

    /// Pop the two oldest tickets if at least two players are waiting.
    pub fn pop_pair(&self) -> Option<(MatchTicket, MatchTicket)> {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() < 2 {
            return None;
        }
        let a = queue.pop_front()?;
        let b = queue.pop_front()?;
        metrics::MATCH_QUEUE_DEPTH.set(queue.len() as i64);
        Some((a, b))
    }

    /// Put a ticket back at the front, keeping its original position.
    pub fn push_front(&self, ticket: MatchTicket) {
        let mut queue = self.inner.lock().unwrap();
        queue.push_front(ticket);
        metrics::MATCH_QUEUE_DEPTH.set(queue.len() as i64);
    }

    pub fn contains(&self, player_id: i64) -> bool {
        let queue = self.inner.lock().unwrap();
        queue.iter().any(|t| t.player_id == player_id)
    }

    pub fn depth(&self) -> usize {
        let queue = self.inner.lock().unwrap();
        queue.len()
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            depth: self.depth(),
        }
    }
}

/// Spawn a background task that pairs waiting players and opens battles.
pub fn spawn_pairing_worker(
    queue: MatchQueue,
    battle_server: Arc<BattleServer>,
    sessions: SessionRegistry,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;

            while let Some((a, b)) = queue.pop_pair() {
                // Drop tickets whose player vanished while waiting; the
                // surviving side keeps its place at the front.
                if !sessions.is_connected(a.player_id) {
                    queue.push_front(b);
                    continue;
                }
                if !sessions.is_connected(b.player_id) {
                    queue.push_front(a);
                    continue;
                }

                match battle_server.start_battle(a.player_id, b.player_id).await {
                    Ok(battle_id) => {
                        tracing::info!(
                            "Matched players {} and {} into battle {}",
                            a.player_id,
                            b.player_id,
                            battle_id
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Pairing worker: could not start battle for {} vs {}: {e}",
                            a.player_id,
                            b.player_id
                        );
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_is_idempotent() {
        let queue = MatchQueue::new();
        assert!(queue.enqueue(1));
        assert!(!queue.enqueue(1));
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn test_pop_pair_fifo_order() {
        let queue = MatchQueue::new();
        queue.enqueue(1);
        assert!(queue.pop_pair().is_none());
        queue.enqueue(2);
        queue.enqueue(3);

        let (a, b) = queue.pop_pair().unwrap();
        assert_eq!(a.player_id, 1);
        assert_eq!(b.player_id, 2);
        assert_eq!(queue.depth(), 1);
        assert!(queue.contains(3));
    }

    #[test]
    fn test_remove() {
        let queue = MatchQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        assert!(queue.remove(1));
        assert!(!queue.remove(1));
        assert_eq!(queue.depth(), 1);
        assert!(!queue.contains(1));
    }

    #[test]
    fn test_push_front_restores_position() {
        let queue = MatchQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);
        let (a, _b) = queue.pop_pair().unwrap();
        queue.push_front(a);

        let (first, second) = queue.pop_pair().unwrap();
        assert_eq!(first.player_id, 1);
        assert_eq!(second.player_id, 3);
    }

    #[test]
    fn test_status_depth() {
        let queue = MatchQueue::new();
        assert_eq!(queue.status().depth, 0);
        queue.enqueue(5);
        assert_eq!(queue.status().depth, 1);
    }
}
