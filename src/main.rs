use std::sync::Arc;

use tower_http::cors::CorsLayer;

use pokearena_backend::api;
use pokearena_backend::battle::server::BattleServer;
use pokearena_backend::config::Config;
use pokearena_backend::db::Database;
use pokearena_backend::matchmaking::{spawn_pairing_worker, MatchQueue};
use pokearena_backend::metrics;
use pokearena_backend::session::SessionRegistry;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let sessions = SessionRegistry::new();
    let queue = MatchQueue::new();
    let battle_server = Arc::new(BattleServer::new(
        db.clone(),
        sessions.clone(),
        config.clone(),
    ));

    // Background worker pairing queued players into battles.
    spawn_pairing_worker(queue.clone(), battle_server.clone(), sessions.clone());

    let app = api::router(db, battle_server, queue, sessions).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Battle backend listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
