// Realtime Pokémon-style battle backend: matchmaking, team select,
// turn-based battles over WebSocket, and durable player records.

pub mod api;
pub mod battle;
pub mod config;
pub mod db;
pub mod error;
pub mod matchmaking;
pub mod metrics;
pub mod session;
