// Battle orchestration: opens battles, routes player commands to the
// task that owns each battle, and broadcasts state to participants and
// spectators.
//
// Each battle runs on its own tokio task with exclusive ownership of the
// state machine. Commands arrive over an mpsc inbox; a periodic sweep on
// the same task enforces the team-select deadline, the turn clock, and
// disconnect grace windows. Because the task re-reads live state when a
// deadline fires, a sweep scheduled against a turn that has since moved
// is a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{Database, PublicProfile};
use crate::error::BattleError;
use crate::metrics;
use crate::session::SessionRegistry;

use super::machine::{Action, Battle, BattleSnapshot, Phase};
use super::team_select::{auto_fill, build_team, validate_picks, OwnedPokemon};
use super::types::{EndReason, PlayerSide, Winner};

/// Messages pushed to participants and spectators as JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BattleMessage {
    OpponentFound {
        battle_id: Uuid,
        opponent: PublicProfile,
        select_deadline: DateTime<Utc>,
    },
    BattleReady {
        state: BattleSnapshot,
    },
    UpdateBattleState {
        state: BattleSnapshot,
    },
    BattleEnded {
        battle_id: Uuid,
        winner: Winner,
        reason: EndReason,
        state: BattleSnapshot,
    },
    BattleError {
        code: &'static str,
        message: String,
    },
}

/// Commands routed into a battle task's inbox.
pub enum BattleCommand {
    SubmitTeam {
        player_id: i64,
        picks: Vec<i64>,
        reply: oneshot::Sender<Result<(), BattleError>>,
    },
    PlayerAction {
        player_id: i64,
        action: Action,
        reply: oneshot::Sender<Result<(), BattleError>>,
    },
    Disconnected {
        player_id: i64,
    },
    Reconnected {
        player_id: i64,
    },
    OpponentCheck {
        player_id: i64,
    },
}

struct BattleHandle {
    player1: i64,
    player2: i64,
    tx: mpsc::UnboundedSender<BattleCommand>,
    broadcast_tx: broadcast::Sender<String>,
    /// Cached last state message so late-joining spectators and
    /// reconnecting players see the battle immediately.
    last_state_json: Arc<Mutex<Option<String>>>,
}

#[derive(Default)]
struct Registry {
    battles: HashMap<Uuid, BattleHandle>,
    by_player: HashMap<i64, Uuid>,
}

/// Manages all live battles and their per-battle tasks.
pub struct BattleServer {
    db: Arc<Database>,
    sessions: SessionRegistry,
    config: Config,
    registry: Arc<Mutex<Registry>>,
}

impl BattleServer {
    pub fn new(db: Arc<Database>, sessions: SessionRegistry, config: Config) -> Self {
        Self {
            db,
            sessions,
            config,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Open a battle between two players and spawn its task. Rejects
    /// players who are already in a live battle.
    pub async fn start_battle(&self, player1: i64, player2: i64) -> Result<Uuid, BattleError> {
        {
            let registry = self.registry.lock().unwrap();
            if registry.by_player.contains_key(&player1)
                || registry.by_player.contains_key(&player2)
            {
                return Err(BattleError::AlreadyInBattle);
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        self.db
            .create_battle(id, player1, player2, &now.to_rfc3339())
            .await?;

        let select_deadline = now + self.config.team_select_window();
        let battle = Battle::new(id, player1, player2, now, select_deadline);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(64);
        let last_state_json = Arc::new(Mutex::new(None));

        {
            let mut registry = self.registry.lock().unwrap();
            // Re-check under the lock; the db insert above awaited.
            if registry.by_player.contains_key(&player1)
                || registry.by_player.contains_key(&player2)
            {
                return Err(BattleError::AlreadyInBattle);
            }
            registry.battles.insert(
                id,
                BattleHandle {
                    player1,
                    player2,
                    tx: cmd_tx,
                    broadcast_tx: broadcast_tx.clone(),
                    last_state_json: last_state_json.clone(),
                },
            );
            registry.by_player.insert(player1, id);
            registry.by_player.insert(player2, id);
            metrics::ACTIVE_BATTLES.set(registry.battles.len() as i64);
        }
        metrics::BATTLES_STARTED_TOTAL.inc();

        // Tell each player who they drew.
        for (me, them) in [(player1, player2), (player2, player1)] {
            if let Ok(Some(opponent)) = self.db.get_player(them).await {
                let msg = BattleMessage::OpponentFound {
                    battle_id: id,
                    opponent: opponent.into(),
                    select_deadline,
                };
                if let Ok(json) = serde_json::to_string(&msg) {
                    self.sessions.notify(me, json);
                }
            }
        }

        let task = BattleTask {
            db: self.db.clone(),
            sessions: self.sessions.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            battle,
            broadcast_tx,
            last_state_json,
            disconnect_deadlines: HashMap::new(),
        };
        tokio::spawn(task.run(cmd_rx));

        tracing::info!("Battle {id} opened for players {player1} and {player2}");
        Ok(id)
    }

    /// The live battle a player is currently in, if any.
    pub fn battle_of(&self, player_id: i64) -> Option<Uuid> {
        let registry = self.registry.lock().unwrap();
        registry.by_player.get(&player_id).copied()
    }

    pub fn is_in_battle(&self, player_id: i64) -> bool {
        self.battle_of(player_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        let registry = self.registry.lock().unwrap();
        registry.battles.len()
    }

    /// Whether this battle is still live in memory.
    pub fn is_live(&self, battle_id: Uuid) -> bool {
        let registry = self.registry.lock().unwrap();
        registry.battles.contains_key(&battle_id)
    }

    /// The last broadcast state message for a live battle.
    pub fn cached_state(&self, battle_id: Uuid) -> Option<String> {
        let registry = self.registry.lock().unwrap();
        let handle = registry.battles.get(&battle_id)?;
        let cached = handle.last_state_json.lock().unwrap().clone();
        cached
    }

    /// Subscribe to a battle's broadcast stream. Also returns the cached
    /// last state message so the subscriber can render immediately.
    pub fn subscribe(&self, battle_id: Uuid) -> Option<(broadcast::Receiver<String>, Option<String>)> {
        let registry = self.registry.lock().unwrap();
        let handle = registry.battles.get(&battle_id)?;
        let cached = handle.last_state_json.lock().unwrap().clone();
        Some((handle.broadcast_tx.subscribe(), cached))
    }

    pub async fn submit_team(&self, player_id: i64, picks: Vec<i64>) -> Result<(), BattleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(
            player_id,
            BattleCommand::SubmitTeam {
                player_id,
                picks,
                reply: reply_tx,
            },
        )?;
        reply_rx
            .await
            .map_err(|_| BattleError::Internal("battle task dropped the request".into()))?
    }

    pub async fn player_action(&self, player_id: i64, action: Action) -> Result<(), BattleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(
            player_id,
            BattleCommand::PlayerAction {
                player_id,
                action,
                reply: reply_tx,
            },
        )?;
        reply_rx
            .await
            .map_err(|_| BattleError::Internal("battle task dropped the request".into()))?
    }

    /// Start the disconnect grace clock for a player who dropped.
    pub fn player_disconnected(&self, player_id: i64) {
        let _ = self.send_command(player_id, BattleCommand::Disconnected { player_id });
    }

    /// Clear the grace clock and resend current state after a reconnect.
    pub fn player_reconnected(&self, player_id: i64) {
        let _ = self.send_command(player_id, BattleCommand::Reconnected { player_id });
    }

    /// A player reports their opponent unresponsive; the battle task
    /// verifies presence and starts the grace clock if warranted.
    pub fn report_unresponsive_opponent(&self, player_id: i64) {
        let _ = self.send_command(player_id, BattleCommand::OpponentCheck { player_id });
    }

    fn send_command(&self, player_id: i64, cmd: BattleCommand) -> Result<(), BattleError> {
        let tx = {
            let registry = self.registry.lock().unwrap();
            let battle_id = registry
                .by_player
                .get(&player_id)
                .ok_or(BattleError::BattleNotFound)?;
            registry
                .battles
                .get(battle_id)
                .ok_or(BattleError::BattleNotFound)?
                .tx
                .clone()
        };
        tx.send(cmd).map_err(|_| BattleError::BattleNotFound)
    }
}

/// The task state owning one battle for its whole lifetime.
struct BattleTask {
    db: Arc<Database>,
    sessions: SessionRegistry,
    config: Config,
    registry: Arc<Mutex<Registry>>,
    battle: Battle,
    broadcast_tx: broadcast::Sender<String>,
    last_state_json: Arc<Mutex<Option<String>>>,
    /// Grace deadlines for disconnected participants.
    disconnect_deadlines: HashMap<i64, DateTime<Utc>>,
}

impl BattleTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BattleCommand>) {
        let mut sweep = tokio::time::interval(std::time::Duration::from_millis(
            self.config.sweep_interval_ms,
        ));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = sweep.tick() => {
                    if self.sweep_deadlines().await {
                        break;
                    }
                }
            }
        }
    }

    /// Returns true once the battle reached its terminal state and was
    /// finalized; the task then exits.
    async fn handle_command(&mut self, cmd: BattleCommand) -> bool {
        match cmd {
            BattleCommand::SubmitTeam {
                player_id,
                picks,
                reply,
            } => {
                let result = self.submit_team(player_id, picks).await;
                if let Err(e) = &result {
                    metrics::ACTIONS_REJECTED_TOTAL
                        .with_label_values(&[e.code()])
                        .inc();
                }
                let _ = reply.send(result);
                false
            }
            BattleCommand::PlayerAction {
                player_id,
                action,
                reply,
            } => {
                let started = std::time::Instant::now();
                let result = self.apply_action(player_id, action);
                metrics::ACTION_APPLY_DURATION_MS
                    .observe(started.elapsed().as_secs_f64() * 1000.0);
                if let Err(e) = &result {
                    metrics::ACTIONS_REJECTED_TOTAL
                        .with_label_values(&[e.code()])
                        .inc();
                }
                let _ = reply.send(result);
                if self.battle.is_ended() {
                    self.finalize().await;
                    return true;
                }
                false
            }
            BattleCommand::Disconnected { player_id } => {
                if self.battle.side_of(player_id).is_some() && !self.battle.is_ended() {
                    self.disconnect_deadlines
                        .insert(player_id, Utc::now() + self.config.disconnect_grace());
                    tracing::info!(
                        "Battle {}: player {player_id} disconnected, grace clock running",
                        self.battle.id
                    );
                }
                false
            }
            BattleCommand::Reconnected { player_id } => {
                self.disconnect_deadlines.remove(&player_id);
                self.send_state_to(player_id);
                false
            }
            BattleCommand::OpponentCheck { player_id } => {
                if let Some(side) = self.battle.side_of(player_id) {
                    let opponent = self.battle.player_id(side.opponent());
                    if !self.sessions.is_connected(opponent) {
                        self.disconnect_deadlines
                            .entry(opponent)
                            .or_insert_with(|| Utc::now() + self.config.disconnect_grace());
                        tracing::info!(
                            "Battle {}: opponent {opponent} reported absent, grace clock running",
                            self.battle.id
                        );
                    }
                    // The requester gets a fresh view either way.
                    self.send_state_to(player_id);
                }
                false
            }
        }
    }

    async fn submit_team(&mut self, player_id: i64, picks: Vec<i64>) -> Result<(), BattleError> {
        let side = self
            .battle
            .side_of(player_id)
            .ok_or(BattleError::BattleNotFound)?;
        if !matches!(self.battle.phase, Phase::TeamSelect(_)) {
            return Err(BattleError::BattleNotActive);
        }

        let inventory = self.load_inventory(player_id).await?;
        validate_picks(&picks, &inventory)?;

        let both_ready = match &mut self.battle.phase {
            Phase::TeamSelect(select) => {
                match side {
                    PlayerSide::Player1 => select.picks1 = picks,
                    PlayerSide::Player2 => select.picks2 = picks,
                }
                select.both_ready()
            }
            _ => false,
        };

        if both_ready {
            let (picks1, picks2) = match &self.battle.phase {
                Phase::TeamSelect(select) => (select.picks1.clone(), select.picks2.clone()),
                _ => return Ok(()),
            };
            self.activate_with(picks1, picks2).await?;
        }
        Ok(())
    }

    fn apply_action(&mut self, player_id: i64, action: Action) -> Result<(), BattleError> {
        let side = self
            .battle
            .side_of(player_id)
            .ok_or(BattleError::BattleNotFound)?;
        let ended = self.battle.apply_action(side, action, Utc::now())?;
        if !ended {
            self.emit(&BattleMessage::UpdateBattleState {
                state: self.battle.snapshot(),
            });
        }
        Ok(())
    }

    /// Build both teams from validated picks and start turn flow.
    async fn activate_with(
        &mut self,
        picks1: Vec<i64>,
        picks2: Vec<i64>,
    ) -> Result<(), BattleError> {
        let inv1 = self.load_inventory(self.battle.player1).await?;
        let inv2 = self.load_inventory(self.battle.player2).await?;
        let team1 = build_team(&picks1, &inv1);
        let team2 = build_team(&picks2, &inv2);
        self.battle.activate(team1, team2, Utc::now());
        self.emit(&BattleMessage::BattleReady {
            state: self.battle.snapshot(),
        });
        Ok(())
    }

    /// Periodic deadline sweep. Returns true if the battle ended.
    async fn sweep_deadlines(&mut self) -> bool {
        let now = Utc::now();

        let select_expired = match &self.battle.phase {
            Phase::TeamSelect(select) => now >= select.deadline,
            _ => false,
        };
        if select_expired {
            if let Err(e) = self.close_team_select(now).await {
                tracing::error!(
                    "Battle {}: closing team select failed: {e}",
                    self.battle.id
                );
                self.fault().await;
                return true;
            }
            if self.battle.is_ended() {
                self.finalize().await;
                return true;
            }
        }

        if matches!(self.battle.phase, Phase::Active(_))
            && self.battle.check_turn_timeout(self.config.turn_timeout(), now)
        {
            self.finalize().await;
            return true;
        }

        self.sweep_disconnects(now).await
    }

    /// Team-select deadline passed: auto-fill both sides from inventory.
    /// A side with nothing to field loses by default; two empty sides
    /// make a draw.
    async fn close_team_select(&mut self, now: DateTime<Utc>) -> Result<(), BattleError> {
        let (picks1, picks2) = match &self.battle.phase {
            Phase::TeamSelect(select) => (select.picks1.clone(), select.picks2.clone()),
            _ => return Ok(()),
        };
        let inv1 = self.load_inventory(self.battle.player1).await?;
        let inv2 = self.load_inventory(self.battle.player2).await?;

        let mut rng = StdRng::from_entropy();
        let picks1 = auto_fill(&picks1, &inv1, &mut rng);
        let picks2 = auto_fill(&picks2, &inv2, &mut rng);

        match (picks1.is_empty(), picks2.is_empty()) {
            (true, true) => self.battle.end(Winner::Draw, EndReason::Timeout, now),
            (true, false) => self.battle.end(Winner::Player2, EndReason::Timeout, now),
            (false, true) => self.battle.end(Winner::Player1, EndReason::Timeout, now),
            (false, false) => {
                let team1 = build_team(&picks1, &inv1);
                let team2 = build_team(&picks2, &inv2);
                self.battle.activate(team1, team2, now);
                self.emit(&BattleMessage::BattleReady {
                    state: self.battle.snapshot(),
                });
            }
        }
        Ok(())
    }

    async fn sweep_disconnects(&mut self, now: DateTime<Utc>) -> bool {
        // A player who reconnected clears their clock even if no explicit
        // reconnect command made it to this task.
        let sessions = &self.sessions;
        self.disconnect_deadlines
            .retain(|pid, _| !sessions.is_connected(*pid));

        let expired: Vec<i64> = self
            .disconnect_deadlines
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(pid, _)| *pid)
            .collect();
        if expired.is_empty() {
            return false;
        }

        if expired.len() >= 2 {
            self.battle.end(Winner::Draw, EndReason::Disconnect, now);
        } else {
            let side = match self.battle.side_of(expired[0]) {
                Some(side) => side,
                None => return false,
            };
            self.battle
                .end(Winner::from_side(side.opponent()), EndReason::Disconnect, now);
        }
        self.finalize().await;
        true
    }

    /// Unrecoverable server fault: tell both players, then settle the
    /// battle as a draw so nobody eats a loss for a server problem.
    async fn fault(&mut self) {
        let msg = BattleMessage::BattleError {
            code: "internalError",
            message: "battle aborted due to a server fault".into(),
        };
        if let Ok(json) = serde_json::to_string(&msg) {
            self.sessions.notify(self.battle.player1, json.clone());
            self.sessions.notify(self.battle.player2, json.clone());
            let _ = self.broadcast_tx.send(json);
        }
        self.battle
            .end(Winner::Draw, EndReason::Disconnect, Utc::now());
        self.finalize().await;
    }

    /// Persist the result, update player records, broadcast the terminal
    /// state, and deregister the battle.
    async fn finalize(&mut self) {
        let (winner, reason, ended_at) = match &self.battle.phase {
            Phase::Ended(state) => (state.winner, state.reason, state.ended_at),
            _ => return,
        };
        let id = self.battle.id;

        match self
            .db
            .finish_battle(id, &ended_at.to_rfc3339(), winner, reason)
            .await
        {
            Ok(true) => {
                for pid in [self.battle.player1, self.battle.player2] {
                    if let Err(e) = self.db.append_history(pid, id).await {
                        tracing::error!("Battle {id}: history append for {pid} failed: {e}");
                    }
                }
                let counted = match winner {
                    Winner::Player1 => Some((self.battle.player1, self.battle.player2)),
                    Winner::Player2 => Some((self.battle.player2, self.battle.player1)),
                    // A draw moves neither counter.
                    Winner::Draw => None,
                };
                if let Some((won, lost)) = counted {
                    if let Err(e) = self.db.record_result(won, true).await {
                        tracing::error!("Battle {id}: win record for {won} failed: {e}");
                    }
                    if let Err(e) = self.db.record_result(lost, false).await {
                        tracing::error!("Battle {id}: loss record for {lost} failed: {e}");
                    }
                }
            }
            Ok(false) => tracing::warn!("Battle {id} was already finalized"),
            Err(e) => tracing::error!("Battle {id}: could not persist result: {e}"),
        }

        metrics::BATTLES_COMPLETED_TOTAL
            .with_label_values(&[reason.name()])
            .inc();
        let duration_secs =
            (ended_at - self.battle.created_at).num_milliseconds() as f64 / 1000.0;
        metrics::BATTLE_DURATION_SECONDS
            .with_label_values(&[reason.name()])
            .observe(duration_secs.max(0.0));

        self.emit(&BattleMessage::BattleEnded {
            battle_id: id,
            winner,
            reason,
            state: self.battle.snapshot(),
        });

        let mut registry = self.registry.lock().unwrap();
        registry.battles.remove(&id);
        registry.by_player.remove(&self.battle.player1);
        registry.by_player.remove(&self.battle.player2);
        metrics::ACTIVE_BATTLES.set(registry.battles.len() as i64);
        tracing::info!(
            "Battle {id} ended: winner {}, reason {}",
            winner.name(),
            reason.name()
        );
    }

    async fn load_inventory(&self, player_id: i64) -> Result<Vec<OwnedPokemon>, BattleError> {
        let rows = self.db.list_inventory(player_id).await?;
        Ok(rows.iter().map(|r| r.to_owned_pokemon()).collect())
    }

    /// Send a state message to both players and the spectator stream,
    /// caching it for late joiners.
    fn emit(&self, msg: &BattleMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            *self.last_state_json.lock().unwrap() = Some(json.clone());
            self.sessions.notify(self.battle.player1, json.clone());
            self.sessions.notify(self.battle.player2, json.clone());
            let _ = self.broadcast_tx.send(json);
        }
    }

    fn send_state_to(&self, player_id: i64) {
        let msg = BattleMessage::UpdateBattleState {
            state: self.battle.snapshot(),
        };
        if let Ok(json) = serde_json::to_string(&msg) {
            self.sessions.notify(player_id, json);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn fast_config() -> Config {
        Config {
            sweep_interval_ms: 25,
            team_select_secs: 1,
            turn_timeout_secs: 1,
            disconnect_grace_secs: 1,
            ..Config::default()
        }
    }

    async fn seeded_server() -> (Arc<Database>, BattleServer, i64, i64) {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let p1 = db.create_player("red").await.unwrap();
        let p2 = db.create_player("blue").await.unwrap();
        for pid in [p1.id, p2.id] {
            for i in 0..3 {
                db.grant_pokemon(pid, &format!("mon-{i}"), "normal", 5, 20, false)
                    .await
                    .unwrap();
            }
        }
        let sessions = SessionRegistry::new();
        let server = BattleServer::new(db.clone(), sessions, fast_config());
        (db, server, p1.id, p2.id)
    }

    async fn team_ids(db: &Database, player_id: i64) -> Vec<i64> {
        db.list_inventory(player_id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect()
    }

    #[tokio::test]
    async fn test_start_battle_rejects_busy_players() {
        let (db, server, p1, p2) = seeded_server().await;
        let id = server.start_battle(p1, p2).await.unwrap();
        assert_eq!(server.battle_of(p1), Some(id));
        assert_eq!(server.battle_of(p2), Some(id));
        assert_eq!(server.active_count(), 1);

        let p3 = db.create_player("green").await.unwrap();
        let err = server.start_battle(p1, p3.id).await.unwrap_err();
        assert_eq!(err, BattleError::AlreadyInBattle);
    }

    #[tokio::test]
    async fn test_submit_team_and_surrender_flow() {
        let (db, server, p1, p2) = seeded_server().await;
        let id = server.start_battle(p1, p2).await.unwrap();
        let (mut rx, _) = server.subscribe(id).unwrap();

        server.submit_team(p1, team_ids(&db, p1).await).await.unwrap();
        server.submit_team(p2, team_ids(&db, p2).await).await.unwrap();

        // Both teams in: activation is broadcast.
        let ready = rx.recv().await.unwrap();
        assert!(ready.contains("\"type\":\"battleReady\""));

        // Actions out of phase or out of turn are rejected without
        // disturbing the battle.
        let err = server
            .player_action(p2, Action::Attack)
            .await
            .unwrap_err();
        assert_eq!(err, BattleError::NotYourTurn);

        server.player_action(p1, Action::Surrender).await.unwrap();

        let ended = rx.recv().await.unwrap();
        assert!(ended.contains("\"type\":\"battleEnded\""));
        assert!(ended.contains("surrender"));

        // The battle is gone from the live registry and durable in the db.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(server.battle_of(p1).is_none());
        let row = db.get_battle(id).await.unwrap().unwrap();
        assert_eq!(row.winner.as_deref(), Some("player2"));
        assert_eq!(row.reason.as_deref(), Some("surrender"));

        // Records moved for both players.
        assert_eq!(db.get_player(p2).await.unwrap().unwrap().wins, 1);
        assert_eq!(db.get_player(p1).await.unwrap().unwrap().losses, 1);
        assert_eq!(db.list_history(p1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_team_select_deadline_auto_fills() {
        let (db, server, p1, p2) = seeded_server().await;
        let id = server.start_battle(p1, p2).await.unwrap();
        let (mut rx, _) = server.subscribe(id).unwrap();

        // Player 1 picks one, player 2 never submits. After the window the
        // sweep fills both sides and activates.
        let picks = vec![team_ids(&db, p1).await[0]];
        server.submit_team(p1, picks).await.unwrap();

        let ready = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            rx.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(ready.contains("\"type\":\"battleReady\""));
        assert!(ready.contains("\"phase\":\"active\""));
    }

    #[tokio::test]
    async fn test_empty_inventory_defaults_at_deadline() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let p1 = db.create_player("red").await.unwrap();
        let p2 = db.create_player("blue").await.unwrap();
        // Only player 1 owns anything.
        db.grant_pokemon(p1.id, "mon", "fire", 5, 20, false)
            .await
            .unwrap();
        let server = BattleServer::new(db.clone(), SessionRegistry::new(), fast_config());

        let id = server.start_battle(p1.id, p2.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1400)).await;

        let row = db.get_battle(id).await.unwrap().unwrap();
        assert_eq!(row.winner.as_deref(), Some("player1"));
        assert_eq!(row.reason.as_deref(), Some("timeout"));
        // Default losses at team select still count on the records.
        assert_eq!(db.get_player(p1.id).await.unwrap().unwrap().wins, 1);
        assert_eq!(db.get_player(p2.id).await.unwrap().unwrap().losses, 1);
    }

    #[tokio::test]
    async fn test_turn_timeout_forfeits_owner() {
        let (db, server, p1, p2) = seeded_server().await;
        let id = server.start_battle(p1, p2).await.unwrap();
        server.submit_team(p1, team_ids(&db, p1).await).await.unwrap();
        server.submit_team(p2, team_ids(&db, p2).await).await.unwrap();

        // Player 1 owns the first turn and never acts.
        tokio::time::sleep(std::time::Duration::from_millis(1400)).await;

        let row = db.get_battle(id).await.unwrap().unwrap();
        assert_eq!(row.winner.as_deref(), Some("player2"));
        assert_eq!(row.reason.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_disconnect_grace_forfeits_absentee() {
        let (db, server, p1, p2) = seeded_server().await;
        let id = server.start_battle(p1, p2).await.unwrap();
        server.submit_team(p1, team_ids(&db, p1).await).await.unwrap();
        server.submit_team(p2, team_ids(&db, p2).await).await.unwrap();

        server.player_disconnected(p2);
        tokio::time::sleep(std::time::Duration::from_millis(1400)).await;

        let row = db.get_battle(id).await.unwrap().unwrap();
        assert_eq!(row.winner.as_deref(), Some("player1"));
        assert_eq!(row.reason.as_deref(), Some("disconnect"));
    }

    #[tokio::test]
    async fn test_reconnect_clears_grace_clock() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let p1 = db.create_player("red").await.unwrap().id;
        let p2 = db.create_player("blue").await.unwrap().id;
        for pid in [p1, p2] {
            for i in 0..3 {
                db.grant_pokemon(pid, &format!("mon-{i}"), "normal", 5, 20, false)
                    .await
                    .unwrap();
            }
        }
        // Long turn budget so only the grace clock could end the battle.
        let config = Config {
            turn_timeout_secs: 60,
            ..fast_config()
        };
        let server = BattleServer::new(db.clone(), SessionRegistry::new(), config);

        server.start_battle(p1, p2).await.unwrap();
        server.submit_team(p1, team_ids(&db, p1).await).await.unwrap();
        server.submit_team(p2, team_ids(&db, p2).await).await.unwrap();

        // Register a live session for p2 so the sweep sees them back.
        let (tx, _rx) = unbounded_channel();
        server.sessions.register(p2, tx);
        server.player_disconnected(p2);
        server.player_reconnected(p2);

        tokio::time::sleep(std::time::Duration::from_millis(1400)).await;
        // Well past the 1s grace window and still in battle.
        assert!(server.is_in_battle(p2));
    }

    #[tokio::test]
    async fn test_subscribe_returns_cached_state() {
        let (db, server, p1, p2) = seeded_server().await;
        let id = server.start_battle(p1, p2).await.unwrap();
        server.submit_team(p1, team_ids(&db, p1).await).await.unwrap();
        server.submit_team(p2, team_ids(&db, p2).await).await.unwrap();

        // A spectator arriving after activation still gets a snapshot.
        let (_rx, cached) = server.subscribe(id).unwrap();
        let cached = cached.unwrap();
        assert!(cached.contains("\"phase\":\"active\""));

        assert!(server.subscribe(Uuid::new_v4()).is_none());
    }
}
