//! Database connection management.

use crate::error::Result;

use anyhow::Context as _;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Shared SQLite connection pool used by every brain in a registry.
#[derive(Debug, Clone)]
pub struct Db {
    pub sqlite: SqlitePool,
}

impl Db {
    /// Connect to (or create) the brain database at `path`.
    ///
    /// WAL mode lets generation reads proceed while a training transaction is
    /// open; writers wait on the busy timeout instead of failing immediately.
    pub async fn connect(path: &Path) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .with_context(|| format!("invalid database path: {}", path.display()))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
            .create_if_missing(true);

        let sqlite = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to SQLite at {}", path.display()))?;

        tracing::debug!(path = %path.display(), "brain database connected");

        Ok(Self { sqlite })
    }

    /// Close the pool, committing the WAL back into the main file.
    pub async fn close(self) {
        self.sqlite.close().await;
    }
}
