// Persisted credential storage

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use super::types::Credentials;

const ACCESS_TOKEN_KEY: &str = "accessToken";
const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Durable storage for the active credential pair
///
/// Implementations are synchronous: reads and writes are local and short,
/// so the client calls them without yielding.
pub trait TokenStore: Send + Sync {
    /// Load the current pair; missing values are `None`
    fn load(&self) -> Result<Credentials>;

    fn set_access_token(&self, token: &str) -> Result<()>;

    fn set_refresh_token(&self, token: &str) -> Result<()>;

    /// Remove both tokens
    fn clear(&self) -> Result<()>;
}

/// In-process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    credentials: RwLock<Credentials>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access_token: Option<&str>, refresh_token: Option<&str>) -> Self {
        Self {
            credentials: RwLock::new(Credentials {
                access_token: access_token.map(str::to_string),
                refresh_token: refresh_token.map(str::to_string),
            }),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Credentials> {
        let creds = self
            .credentials
            .read()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        Ok(creds.clone())
    }

    fn set_access_token(&self, token: &str) -> Result<()> {
        let mut creds = self
            .credentials
            .write()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        creds.access_token = Some(token.to_string());
        Ok(())
    }

    fn set_refresh_token(&self, token: &str) -> Result<()> {
        let mut creds = self
            .credentials
            .write()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        creds.refresh_token = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut creds = self
            .credentials
            .write()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        *creds = Credentials::default();
        Ok(())
    }
}

/// SQLite-backed token store
/// Tokens live in an `auth_kv` key/value table, one row per token.
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Open (or create) the token database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create token directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Non-durable store, for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create auth_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Token database lock poisoned"))
    }

    fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        conn.query_row(
            "SELECT value FROM auth_kv WHERE key = ?",
            [key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read {} from SQLite", key))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO auth_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .with_context(|| format!("Failed to write {} to SQLite", key))?;
        Ok(())
    }

    /// When the stored pair was last written
    pub fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.connection()?;
        let raw: Option<String> = conn
            .query_row("SELECT MAX(updated_at) FROM auth_kv", [], |row| row.get(0))
            .context("Failed to read token timestamps")?;

        raw.map(|s| parse_datetime(&s)).transpose()
    }
}

impl TokenStore for SqliteTokenStore {
    fn load(&self) -> Result<Credentials> {
        let conn = self.connection()?;
        Ok(Credentials {
            access_token: Self::get(&conn, ACCESS_TOKEN_KEY)?,
            refresh_token: Self::get(&conn, REFRESH_TOKEN_KEY)?,
        })
    }

    fn set_access_token(&self, token: &str) -> Result<()> {
        self.put(ACCESS_TOKEN_KEY, token)
    }

    fn set_refresh_token(&self, token: &str) -> Result<()> {
        self.put(REFRESH_TOKEN_KEY, token)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM auth_kv WHERE key IN (?1, ?2)",
            params![ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY],
        )
        .context("Failed to clear tokens from SQLite")?;
        Ok(())
    }
}

/// Parse datetime from ISO 8601 / RFC 3339
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Handle Z suffix
    let normalized = if s.ends_with('Z') {
        s.replace('Z', "+00:00")
    } else {
        s.to_string()
    };

    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse datetime: {}", s))
}
