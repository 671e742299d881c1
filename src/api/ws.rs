// WebSocket handler: the realtime protocol for matchmaking, team
// select, battle actions, and spectating.
//
// Each socket gets an outbound writer task fed by an unbounded channel;
// the same sender is registered in the session registry so battle tasks
// and the pairing worker can push events to the player. The read loop on
// the socket dispatches client events and sends rejections back on the
// originating connection only.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::battle::machine::Action;
use crate::error::BattleError;
use crate::metrics;

use super::AppState;

/// Events the client sends over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to a player. Must precede everything else.
    Register { player_id: i64 },
    JoinMatching,
    LeaveMatching,
    SubmitTeam { pokemon_ids: Vec<i64> },
    PlayerAction {
        #[serde(flatten)]
        action: Action,
    },
    /// Watch a battle without participating.
    Spectate { battle_id: Uuid },
    /// Claim the opponent has stopped responding.
    EnemyNotResponding,
}

/// Connection-level replies. Battle state events are produced by the
/// battle tasks and share the same tagged-JSON wire shape.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WsReply {
    Registered { player_id: i64 },
    QueueJoined { depth: usize },
    QueueLeft,
    BattleError { code: &'static str, message: String },
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    metrics::CONNECTED_WEBSOCKETS.inc();

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // Writer task: everything outbound funnels through one channel so
    // battle tasks and this read loop never contend for the sink.
    let writer: JoinHandle<()> = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut conn = Connection {
        state,
        out_tx,
        player: None,
        spectate_task: None,
    };

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => conn.handle_event(event).await,
                    Err(e) => conn.send_error(
                        "badRequest",
                        format!("unrecognized client event: {e}"),
                    ),
                }
            }
            Message::Close(_) => break,
            // Pings are answered by axum; ignore the rest.
            _ => {}
        }
    }

    conn.teardown();
    writer.abort();
    metrics::CONNECTED_WEBSOCKETS.dec();
}

struct Connection {
    state: AppState,
    out_tx: mpsc::UnboundedSender<String>,
    /// Set once the connection registers: (player id, connection id).
    player: Option<(i64, Uuid)>,
    spectate_task: Option<JoinHandle<()>>,
}

impl Connection {
    async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Register { player_id } => self.register(player_id).await,
            ClientEvent::JoinMatching => self.join_matching().await,
            ClientEvent::LeaveMatching => {
                if let Some((player_id, _)) = self.player {
                    self.state.queue.remove(player_id);
                    self.send(&WsReply::QueueLeft);
                } else {
                    self.require_registration();
                }
            }
            ClientEvent::SubmitTeam { pokemon_ids } => {
                let Some((player_id, _)) = self.player else {
                    return self.require_registration();
                };
                if let Err(e) = self.state.battle_server.submit_team(player_id, pokemon_ids).await
                {
                    self.send_battle_error(&e);
                }
            }
            ClientEvent::PlayerAction { action } => {
                let Some((player_id, _)) = self.player else {
                    return self.require_registration();
                };
                if let Err(e) = self.state.battle_server.player_action(player_id, action).await {
                    self.send_battle_error(&e);
                }
            }
            ClientEvent::Spectate { battle_id } => self.spectate(battle_id),
            ClientEvent::EnemyNotResponding => {
                if let Some((player_id, _)) = self.player {
                    self.state.battle_server.report_unresponsive_opponent(player_id);
                } else {
                    self.require_registration();
                }
            }
        }
    }

    async fn register(&mut self, player_id: i64) {
        match self.state.db.get_player(player_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return self.send_error("battleNotFound", format!("no player {player_id}"));
            }
            Err(e) => {
                tracing::error!("Player lookup for {player_id} failed: {e}");
                return self.send_error("internalError", "player lookup failed".into());
            }
        }

        // Re-registering moves this socket to the new identity.
        if let Some((old_id, old_conn)) = self.player.take() {
            self.state.sessions.unregister(old_id, old_conn);
        }
        let conn_id = self.state.sessions.register(player_id, self.out_tx.clone());
        self.player = Some((player_id, conn_id));
        self.send(&WsReply::Registered { player_id });

        // A participant coming back mid-battle gets current state and
        // stops their disconnect grace clock.
        if self.state.battle_server.is_in_battle(player_id) {
            self.state.battle_server.player_reconnected(player_id);
        }
    }

    async fn join_matching(&mut self) {
        let Some((player_id, _)) = self.player else {
            return self.require_registration();
        };
        if self.state.battle_server.is_in_battle(player_id) {
            return self.send_battle_error(&BattleError::AlreadyInBattle);
        }
        self.state.queue.enqueue(player_id);
        self.send(&WsReply::QueueJoined {
            depth: self.state.queue.depth(),
        });
    }

    /// Attach this socket to a battle's broadcast stream. Replaces any
    /// previous spectate subscription.
    fn spectate(&mut self, battle_id: Uuid) {
        let Some((mut rx, cached)) = self.state.battle_server.subscribe(battle_id) else {
            return self.send_battle_error(&BattleError::BattleNotFound);
        };
        if let Some(task) = self.spectate_task.take() {
            task.abort();
        }
        let out_tx = self.out_tx.clone();
        if let Some(json) = cached {
            let _ = out_tx.send(json);
        }
        self.spectate_task = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        if out_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Spectator lagged, skipped {n} messages");
                    }
                }
            }
        }));
    }

    /// Socket closed: drop the session (only if still ours), leave the
    /// queue, and start the in-battle grace clock.
    fn teardown(&mut self) {
        if let Some(task) = self.spectate_task.take() {
            task.abort();
        }
        if let Some((player_id, conn_id)) = self.player.take() {
            self.state.queue.remove(player_id);
            if self.state.sessions.unregister(player_id, conn_id)
                && self.state.battle_server.is_in_battle(player_id)
            {
                self.state.battle_server.player_disconnected(player_id);
            }
        }
    }

    fn send(&self, reply: &WsReply) {
        if let Ok(json) = serde_json::to_string(reply) {
            let _ = self.out_tx.send(json);
        }
    }

    fn send_error(&self, code: &'static str, message: String) {
        self.send(&WsReply::BattleError { code, message });
    }

    fn send_battle_error(&self, err: &BattleError) {
        self.send(&WsReply::BattleError {
            code: err.code(),
            message: err.to_string(),
        });
    }

    fn require_registration(&self) {
        self.send_error("badRequest", "register before sending battle events".into());
    }
}
