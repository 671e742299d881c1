// Application configuration, loaded from environment variables and CLI flags.

use chrono::Duration;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Seconds a turn owner has to act before forfeiting by timeout.
    pub turn_timeout_secs: i64,
    /// Seconds both players have to submit a team before auto-fill.
    pub team_select_secs: i64,
    /// Seconds a disconnected participant has to reconnect before
    /// forfeiting. Deliberately configurable rather than a guessed literal.
    pub disconnect_grace_secs: i64,
    /// Milliseconds between deadline sweeps inside each battle task.
    pub sweep_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:arena.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `TURN_TIMEOUT_SECS` - turn budget (default: 30)
    /// - `TEAM_SELECT_SECS` - team-select window (default: 35)
    /// - `DISCONNECT_GRACE_SECS` - reconnect grace window (default: 60)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:arena.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        Config {
            database_url,
            port,
            turn_timeout_secs: Self::env_i64("TURN_TIMEOUT_SECS", 30),
            team_select_secs: Self::env_i64("TEAM_SELECT_SECS", 35),
            disconnect_grace_secs: Self::env_i64("DISCONNECT_GRACE_SECS", 60),
            sweep_interval_ms: 1000,
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::seconds(self.turn_timeout_secs)
    }

    pub fn team_select_window(&self) -> Duration {
        Duration::seconds(self.team_select_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::seconds(self.disconnect_grace_secs)
    }

    fn env_i64(name: &str, default: i64) -> i64 {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            port: 3000,
            turn_timeout_secs: 30,
            team_select_secs: 35,
            disconnect_grace_secs: 60,
            sweep_interval_ms: 1000,
        }
    }
}
