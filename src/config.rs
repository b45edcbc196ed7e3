//! Environment-driven configuration.
//!
//! ## Store connection
//!
//! - `DATABASE_URL`: full connection string; overrides the discrete settings
//! - `GRAPH_DB_PROTOCOL`: connection protocol (default: postgresql)
//! - `GRAPH_DB_HOST`: host (default: localhost)
//! - `GRAPH_DB_PORT`: port (default: 5432)
//! - `GRAPH_DB_USER`: user name (default: postgres)
//! - `GRAPH_DB_PASSWORD`: password (default: empty)
//! - `GRAPH_DB_NAME`: logical database (default: variables)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Service
//!
//! - `HOST` / `PORT`: bind address (default: 0.0.0.0:8002)
//! - `GRAPH_STORE`: `memory` or `postgres` (default: memory)
//! - `CATALOG_PATH`: catalog JSON file or directory
//! - `UNKNOWN_VARIABLES`: `ignore` or `reject` (default: ignore)
//! - `LOG_FORMAT`: `json` or `pretty` (default: json)

use std::fmt;
use std::path::PathBuf;

use crate::augmenter::UnknownVariablePolicy;

/// Connection and pool settings for the backing graph store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Full connection URL; takes precedence over the discrete fields.
    pub database_url: Option<String>,
    /// Connection protocol.
    pub protocol: String,
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Logical database / namespace.
    pub database: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl StoreConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            protocol: text("GRAPH_DB_PROTOCOL", "postgresql"),
            host: text("GRAPH_DB_HOST", "localhost"),
            port: parse_or(&lookup, "GRAPH_DB_PORT", 5432),
            user: text("GRAPH_DB_USER", "postgres"),
            password: text("GRAPH_DB_PASSWORD", ""),
            database: text("GRAPH_DB_NAME", "variables"),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10),
            min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: parse_or(&lookup, "DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: parse_or(&lookup, "DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: parse_or(&lookup, "DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

// Manual impl keeps the password out of logs.
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish_non_exhaustive()
    }
}

/// Which store backend the service runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Catalogs served from process memory.
    Memory,
    /// Catalogs stored in PostgreSQL.
    Postgres,
}

impl StoreKind {
    /// Parse a backend name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "" => Some(Self::Memory),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Log output format for the service binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable output for development.
    Pretty,
}

impl LogFormat {
    /// Parse a format name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" | "" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Settings for the REST service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Store backend.
    pub store: StoreKind,
    /// Catalog file or directory, read at startup and on reload.
    pub catalog_path: Option<PathBuf>,
    /// What to do with requested ids the catalog does not define.
    pub unknown_variables: UnknownVariablePolicy,
    /// Log output format.
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unrecognized enum values fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = lookup("GRAPH_STORE").unwrap_or_default();
        let store = StoreKind::from_str(&store).unwrap_or_else(|| {
            tracing::warn!(value = %store, "Unknown GRAPH_STORE, using memory");
            StoreKind::Memory
        });

        let unknown = lookup("UNKNOWN_VARIABLES").unwrap_or_default();
        let unknown_variables = UnknownVariablePolicy::from_str(&unknown).unwrap_or_else(|| {
            tracing::warn!(value = %unknown, "Unknown UNKNOWN_VARIABLES, using ignore");
            UnknownVariablePolicy::Ignore
        });

        let format = lookup("LOG_FORMAT").unwrap_or_default();
        let log_format = LogFormat::from_str(&format).unwrap_or_else(|| {
            tracing::warn!(value = %format, "Unknown LOG_FORMAT, using json");
            LogFormat::Json
        });

        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8002),
            store,
            catalog_path: lookup("CATALOG_PATH").filter(|s| !s.is_empty()).map(PathBuf::from),
            unknown_variables,
            log_format,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}
