//! Startup configuration (§6.4, SPEC_FULL.md §4.8).
//!
//! Mirrors the reference framework's config layering (file < env), minus
//! the file-discovery layer — file-system discovery of procedure sources
//! is explicitly out of scope (§1), so `TrxConfig` is built
//! programmatically by the embedding binary and only overlaid with
//! environment variables.

/// The supported database backends (§6.4). Only `Sqlite` ships a concrete
/// driver in this workspace (trx-sql, feature `sqlite`); `Postgres` and
/// `Odbc` are recognised configuration values for a driver the embedding
/// application supplies, per the abstract contract in §6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
    Odbc,
}

impl DbKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Some(DbKind::Sqlite),
            "postgres" | "postgresql" => Some(DbKind::Postgres),
            "odbc" => Some(DbKind::Odbc),
            _ => None,
        }
    }
}

/// Database connection configuration (§6.4 `dbConfig`).
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub kind: DbKind,
    pub connection_string: Option<String>,
    pub database_path: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database_name: Option<String>,
}

impl DbConfig {
    pub fn sqlite(database_path: impl Into<String>) -> Self {
        DbConfig {
            kind: DbKind::Sqlite,
            connection_string: None,
            database_path: Some(database_path.into()),
            host: None,
            port: None,
            username: None,
            password: None,
            database_name: None,
        }
    }

    pub fn in_memory_sqlite() -> Self {
        Self::sqlite(":memory:")
    }
}

/// Top-level startup configuration (§6.4): `port`, `sourcePaths`,
/// `procedure` (default landing-page procedure), `threadCount`, `dbConfig`.
#[derive(Debug, Clone)]
pub struct TrxConfig {
    pub port: u16,
    pub source_paths: Vec<String>,
    pub default_procedure: Option<String>,
    pub thread_count: usize,
    pub db: DbConfig,
}

impl TrxConfig {
    pub fn new(db: DbConfig) -> Self {
        TrxConfig {
            port: 8080,
            source_paths: Vec::new(),
            default_procedure: None,
            thread_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            db,
        }
    }

    /// Overlays `TRX_PORT`, `TRX_THREAD_COUNT`, `TRX_DB_TYPE`,
    /// `TRX_DB_CONNECTION_STRING` (and related `TRX_DB_*` variables) from the
    /// process environment on top of the current values, highest priority
    /// last — the same overlay order the reference framework's config
    /// loader uses for its (broader) YAML/env layering.
    pub fn apply_env_overlay(mut self) -> Self {
        if let Ok(port) = std::env::var("TRX_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }
        if let Ok(threads) = std::env::var("TRX_THREAD_COUNT") {
            if let Ok(n) = threads.parse() {
                self.thread_count = n;
            }
        }
        if let Ok(proc_name) = std::env::var("TRX_DEFAULT_PROCEDURE") {
            self.default_procedure = Some(proc_name);
        }
        if let Ok(kind) = std::env::var("TRX_DB_TYPE") {
            if let Some(k) = DbKind::parse(&kind) {
                self.db.kind = k;
            }
        }
        if let Ok(v) = std::env::var("TRX_DB_CONNECTION_STRING") {
            self.db.connection_string = Some(v);
        }
        if let Ok(v) = std::env::var("TRX_DB_PATH") {
            self.db.database_path = Some(v);
        }
        if let Ok(v) = std::env::var("TRX_DB_HOST") {
            self.db.host = Some(v);
        }
        if let Ok(v) = std::env::var("TRX_DB_PORT") {
            if let Ok(p) = v.parse() {
                self.db.port = Some(p);
            }
        }
        if let Ok(v) = std::env::var("TRX_DB_USERNAME") {
            self.db.username = Some(v);
        }
        if let Ok(v) = std::env::var("TRX_DB_PASSWORD") {
            self.db.password = Some(v);
        }
        if let Ok(v) = std::env::var("TRX_DB_NAME") {
            self.db.database_name = Some(v);
        }
        self
    }
}
