// Database access layer (SQLite via sqlx): player profiles, Pokémon
// inventory, durable battle records, and per-player battle history.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::battle::team_select::OwnedPokemon;
use crate::battle::types::{ElementType, EndReason, Winner};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub wins: i64,
    pub losses: i64,
    pub created_at: String,
}

/// Public view of a player sent to their opponent on pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: i64,
    pub name: String,
    pub wins: i64,
    pub losses: i64,
}

impl From<Player> for PublicProfile {
    fn from(p: Player) -> Self {
        PublicProfile {
            id: p.id,
            name: p.name,
            wins: p.wins,
            losses: p.losses,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryRow {
    pub id: i64,
    pub owner_id: i64,
    pub species: String,
    pub element: String,
    pub is_shiny: bool,
    pub attack: i64,
    pub max_hp: i64,
}

impl InventoryRow {
    pub fn to_owned_pokemon(&self) -> OwnedPokemon {
        OwnedPokemon {
            id: self.id,
            species: self.species.clone(),
            element: ElementType::from_name(&self.element),
            attack: self.attack as i32,
            max_hp: self.max_hp as i32,
            is_shiny: self.is_shiny,
        }
    }
}

/// Durable battle record. Written at creation, finalized once on end;
/// addressable by id for the spectating and history-lookup paths.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BattleRow {
    pub id: String,
    pub player1_id: i64,
    pub player2_id: i64,
    pub created_at: String,
    pub ended_at: Option<String>,
    pub winner: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryRow {
    pub player_id: i64,
    pub battle_id: String,
    pub recorded_at: String,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
                species TEXT NOT NULL,
                element TEXT NOT NULL DEFAULT 'normal',
                is_shiny INTEGER NOT NULL DEFAULT 0,
                attack INTEGER NOT NULL,
                max_hp INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS battles (
                id TEXT PRIMARY KEY,
                player1_id INTEGER NOT NULL REFERENCES players(id),
                player2_id INTEGER NOT NULL REFERENCES players(id),
                created_at TEXT NOT NULL,
                ended_at TEXT,
                winner TEXT,
                reason TEXT
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS battle_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL REFERENCES players(id),
                battle_id TEXT NOT NULL REFERENCES battles(id),
                recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Players ───────────────────────────────────────────────────────

    pub async fn create_player(&self, name: &str) -> Result<Player, sqlx::Error> {
        let row = sqlx::query_as::<_, Player>(
            "INSERT INTO players (name) VALUES (?) RETURNING id, name, wins, losses, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_player(&self, id: i64) -> Result<Option<Player>, sqlx::Error> {
        let row = sqlx::query_as::<_, Player>(
            "SELECT id, name, wins, losses, created_at FROM players WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Increment the win or loss counter for one participant.
    pub async fn record_result(&self, player_id: i64, won: bool) -> Result<(), sqlx::Error> {
        let query = if won {
            "UPDATE players SET wins = wins + 1 WHERE id = ?"
        } else {
            "UPDATE players SET losses = losses + 1 WHERE id = ?"
        };
        sqlx::query(query).bind(player_id).execute(&self.pool).await?;
        Ok(())
    }

    // ── Inventory ─────────────────────────────────────────────────────

    pub async fn grant_pokemon(
        &self,
        owner_id: i64,
        species: &str,
        element: &str,
        attack: i64,
        max_hp: i64,
        is_shiny: bool,
    ) -> Result<InventoryRow, sqlx::Error> {
        let row = sqlx::query_as::<_, InventoryRow>(
            "INSERT INTO inventory (owner_id, species, element, attack, max_hp, is_shiny) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id, owner_id, species, element, is_shiny, attack, max_hp",
        )
        .bind(owner_id)
        .bind(species)
        .bind(element)
        .bind(attack)
        .bind(max_hp)
        .bind(is_shiny)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_inventory(&self, owner_id: i64) -> Result<Vec<InventoryRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, InventoryRow>(
            "SELECT id, owner_id, species, element, is_shiny, attack, max_hp \
             FROM inventory WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ── Battles ───────────────────────────────────────────────────────

    pub async fn create_battle(
        &self,
        id: Uuid,
        player1_id: i64,
        player2_id: i64,
        created_at: &str,
    ) -> Result<BattleRow, sqlx::Error> {
        let row = sqlx::query_as::<_, BattleRow>(
            "INSERT INTO battles (id, player1_id, player2_id, created_at) VALUES (?, ?, ?, ?) \
             RETURNING id, player1_id, player2_id, created_at, ended_at, winner, reason",
        )
        .bind(id.to_string())
        .bind(player1_id)
        .bind(player2_id)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_battle(&self, id: Uuid) -> Result<Option<BattleRow>, sqlx::Error> {
        let row = sqlx::query_as::<_, BattleRow>(
            "SELECT id, player1_id, player2_id, created_at, ended_at, winner, reason \
             FROM battles WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Finalize a battle record. The row becomes read-only history.
    pub async fn finish_battle(
        &self,
        id: Uuid,
        ended_at: &str,
        winner: Winner,
        reason: EndReason,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE battles SET ended_at = ?, winner = ?, reason = ? \
             WHERE id = ? AND ended_at IS NULL",
        )
        .bind(ended_at)
        .bind(winner.name())
        .bind(reason.name())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Battle history ────────────────────────────────────────────────

    pub async fn append_history(&self, player_id: i64, battle_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO battle_history (player_id, battle_id) VALUES (?, ?)")
            .bind(player_id)
            .bind(battle_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_history(&self, player_id: i64) -> Result<Vec<BattleRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, BattleRow>(
            "SELECT b.id, b.player1_id, b.player2_id, b.created_at, b.ended_at, b.winner, b.reason \
             FROM battle_history h JOIN battles b ON b.id = h.battle_id \
             WHERE h.player_id = ? ORDER BY h.id DESC",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_player() {
        let db = test_db().await;

        let p = db.create_player("ash").await.unwrap();
        assert_eq!(p.name, "ash");
        assert_eq!(p.wins, 0);
        assert_eq!(p.losses, 0);

        let fetched = db.get_player(p.id).await.unwrap();
        assert_eq!(fetched.unwrap().name, "ash");

        let missing = db.get_player(999).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_record_result() {
        let db = test_db().await;
        let p = db.create_player("misty").await.unwrap();

        db.record_result(p.id, true).await.unwrap();
        db.record_result(p.id, true).await.unwrap();
        db.record_result(p.id, false).await.unwrap();

        let p = db.get_player(p.id).await.unwrap().unwrap();
        assert_eq!(p.wins, 2);
        assert_eq!(p.losses, 1);
    }

    #[tokio::test]
    async fn test_inventory_round_trip() {
        let db = test_db().await;
        let p = db.create_player("brock").await.unwrap();

        db.grant_pokemon(p.id, "charmander", "fire", 6, 24, false)
            .await
            .unwrap();
        db.grant_pokemon(p.id, "squirtle", "water", 5, 26, true)
            .await
            .unwrap();

        let inv = db.list_inventory(p.id).await.unwrap();
        assert_eq!(inv.len(), 2);
        assert_eq!(inv[0].species, "charmander");
        assert!(!inv[0].is_shiny);
        assert!(inv[1].is_shiny);

        let owned = inv[0].to_owned_pokemon();
        assert_eq!(owned.element, ElementType::Fire);
        assert_eq!(owned.attack, 6);
        assert_eq!(owned.max_hp, 24);

        // Unknown element degrades to normal
        db.grant_pokemon(p.id, "porygon", "digital", 4, 20, false)
            .await
            .unwrap();
        let inv = db.list_inventory(p.id).await.unwrap();
        assert_eq!(inv[2].to_owned_pokemon().element, ElementType::Normal);
    }

    #[tokio::test]
    async fn test_battle_lifecycle() {
        let db = test_db().await;
        let p1 = db.create_player("red").await.unwrap();
        let p2 = db.create_player("blue").await.unwrap();

        let id = Uuid::new_v4();
        let row = db
            .create_battle(id, p1.id, p2.id, "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(row.player1_id, p1.id);
        assert!(row.ended_at.is_none());

        let finished = db
            .finish_battle(id, "2026-01-01T00:05:00Z", Winner::Player1, EndReason::Ko)
            .await
            .unwrap();
        assert!(finished);

        let row = db.get_battle(id).await.unwrap().unwrap();
        assert_eq!(row.winner.as_deref(), Some("player1"));
        assert_eq!(row.reason.as_deref(), Some("ko"));

        // Finalizing twice is a no-op
        let again = db
            .finish_battle(
                id,
                "2026-01-01T00:06:00Z",
                Winner::Player2,
                EndReason::Surrender,
            )
            .await
            .unwrap();
        assert!(!again);
        let row = db.get_battle(id).await.unwrap().unwrap();
        assert_eq!(row.winner.as_deref(), Some("player1"));
    }

    #[tokio::test]
    async fn test_battle_history() {
        let db = test_db().await;
        let p1 = db.create_player("gold").await.unwrap();
        let p2 = db.create_player("silver").await.unwrap();

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        db.create_battle(first, p1.id, p2.id, "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        db.create_battle(second, p1.id, p2.id, "2026-01-02T00:00:00Z")
            .await
            .unwrap();

        db.append_history(p1.id, first).await.unwrap();
        db.append_history(p2.id, first).await.unwrap();
        db.append_history(p1.id, second).await.unwrap();

        let h1 = db.list_history(p1.id).await.unwrap();
        assert_eq!(h1.len(), 2);
        // Most recent first
        assert_eq!(h1[0].id, second.to_string());

        let h2 = db.list_history(p2.id).await.unwrap();
        assert_eq!(h2.len(), 1);
    }
}
