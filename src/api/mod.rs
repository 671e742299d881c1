// HTTP API routes (player profiles, inventory, battle lookups) and the
// WebSocket entry point.

pub mod ws;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::battle::server::BattleServer;
use crate::db::Database;
use crate::matchmaking::MatchQueue;
use crate::metrics;
use crate::session::SessionRegistry;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreatePlayerRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct GrantPokemonRequest {
    pub species: String,
    pub element: String,
    pub attack: i64,
    pub max_hp: i64,
    #[serde(default)]
    pub is_shiny: bool,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub battle_server: Arc<BattleServer>,
    pub queue: MatchQueue,
    pub sessions: SessionRegistry,
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: sqlx::Error) -> impl IntoResponse {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(
    db: Arc<Database>,
    battle_server: Arc<BattleServer>,
    queue: MatchQueue,
    sessions: SessionRegistry,
) -> Router {
    let state = AppState {
        db,
        battle_server,
        queue,
        sessions,
    };

    Router::new()
        // Health and metrics
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        // Players
        .route("/api/players", post(create_player))
        .route("/api/players/{id}", get(get_player))
        .route(
            "/api/players/{id}/pokemon",
            get(list_pokemon).post(grant_pokemon),
        )
        .route("/api/players/{id}/history", get(get_history))
        // Battles
        .route("/api/battles/{id}", get(get_battle))
        // Queue
        .route("/api/queue/status", get(queue_status))
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

// ── Health and metrics ────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler() -> impl IntoResponse {
    metrics::gather_metrics()
}

// ── Player handlers ───────────────────────────────────────────────────

async fn create_player(
    State(state): State<AppState>,
    Json(req): Json<CreatePlayerRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "name is required").into_response();
    }
    match state.db.create_player(req.name.trim()).await {
        Ok(player) => (StatusCode::CREATED, Json(json!(player))).into_response(),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            json_error(StatusCode::CONFLICT, "name is taken").into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_player(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.db.get_player(id).await {
        Ok(Some(player)) => (StatusCode::OK, Json(json!(player))).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Player not found").into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

// ── Inventory handlers ────────────────────────────────────────────────

async fn list_pokemon(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.db.list_inventory(id).await {
        Ok(rows) => (StatusCode::OK, Json(json!(rows))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn grant_pokemon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<GrantPokemonRequest>,
) -> impl IntoResponse {
    if req.species.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "species is required").into_response();
    }
    if req.attack <= 0 || req.max_hp <= 0 {
        return json_error(StatusCode::BAD_REQUEST, "attack and max_hp must be positive")
            .into_response();
    }
    match state.db.get_player(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Player not found").into_response(),
        Err(e) => return internal_error(e).into_response(),
    }
    match state
        .db
        .grant_pokemon(
            id,
            &req.species,
            &req.element,
            req.attack,
            req.max_hp,
            req.is_shiny,
        )
        .await
    {
        Ok(row) => (StatusCode::CREATED, Json(json!(row))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

// ── History and battle handlers ───────────────────────────────────────

async fn get_history(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.db.list_history(id).await {
        Ok(rows) => (StatusCode::OK, Json(json!(rows))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// Durable battle record, with the live in-memory state attached while
/// the battle is still running.
async fn get_battle(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.db.get_battle(id).await {
        Ok(Some(row)) => {
            let live_state = state
                .battle_server
                .cached_state(id)
                .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok());
            (
                StatusCode::OK,
                Json(json!({
                    "battle": row,
                    "live": state.battle_server.is_live(id),
                    "state": live_state,
                })),
            )
                .into_response()
        }
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Battle not found").into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

// ── Queue handlers ────────────────────────────────────────────────────

async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.queue.status()))
}
