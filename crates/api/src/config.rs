use std::time::Duration;

use cantor_core::collaboration::COMMAND_EXPIRY_SECS;

/// Default cap on HTTP request bodies. Bulk uploads of long strokes stay well
/// under it.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Largest accepted request body in bytes (default: 2 MiB).
    pub max_body_bytes: usize,
    /// PostgreSQL URL. Annotations are kept in memory when unset.
    pub database_url: Option<String>,
    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
    /// Realtime collaboration tuning.
    pub realtime: RealtimeConfig,
}

/// Settings for rooms, the event router, and their background jobs.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Gzip+base64 stored SVG when it pays off (default: `true`).
    pub compress_annotations: bool,
    /// Persist completed strokes from `drawing-event` frames (default: `true`).
    pub persist_strokes: bool,
    /// Participants idle longer than this are evicted (default: `60`).
    pub idle_timeout_secs: u64,
    /// How often the idle sweep runs (default: `15`).
    pub cleanup_interval_secs: u64,
    /// Interval between WebSocket pings (default: `30`).
    pub heartbeat_interval_secs: u64,
    /// Lifetime of a `command:received` frame (default: `30`).
    pub command_expiry_secs: i64,
    /// Sockets that have not sent `connect` by then are closed (default: `10`).
    pub join_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            compress_annotations: true,
            persist_strokes: true,
            idle_timeout_secs: 60,
            cleanup_interval_secs: 15,
            heartbeat_interval_secs: 30,
            command_expiry_secs: COMMAND_EXPIRY_SECS,
            join_timeout_secs: 10,
        }
    }
}

impl RealtimeConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                    |
    /// |------------------------------|----------------------------|
    /// | `HOST`                       | `0.0.0.0`                  |
    /// | `PORT`                       | `3000`                     |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                       |
    /// | `MAX_BODY_BYTES`             | `2097152`                  |
    /// | `DATABASE_URL`               | unset (in-memory store)    |
    /// | `LOG_FORMAT`                 | `pretty` (or `json`)       |
    /// | `COMPRESS_ANNOTATIONS`       | `true`                     |
    /// | `PERSIST_STROKES`            | `true`                     |
    /// | `ROOM_IDLE_TIMEOUT_SECS`     | `60`                       |
    /// | `ROOM_CLEANUP_INTERVAL_SECS` | `15`                       |
    /// | `HEARTBEAT_INTERVAL_SECS`    | `30`                       |
    /// | `COMMAND_EXPIRY_SECS`        | `30`                       |
    /// | `JOIN_TIMEOUT_SECS`          | `10`                       |
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_body_bytes = env_parse("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let json_logs = std::env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let defaults = RealtimeConfig::default();
        let realtime = RealtimeConfig {
            compress_annotations: env_bool("COMPRESS_ANNOTATIONS", defaults.compress_annotations),
            persist_strokes: env_bool("PERSIST_STROKES", defaults.persist_strokes),
            idle_timeout_secs: env_parse("ROOM_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            cleanup_interval_secs: env_parse(
                "ROOM_CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval_secs,
            ),
            heartbeat_interval_secs: env_parse(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            ),
            command_expiry_secs: env_parse("COMMAND_EXPIRY_SECS", defaults.command_expiry_secs),
            join_timeout_secs: env_parse("JOIN_TIMEOUT_SECS", defaults.join_timeout_secs),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_body_bytes,
            database_url,
            json_logs,
            realtime,
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} is invalid ('{raw}'): {e}")),
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => panic!("{key} must be a boolean, got '{raw}'"),
        },
        Err(_) => default,
    }
}
