//! Table layout for one brain: a seed table and a transition table, both
//! namespaced by tenant id inside the shared database.

use crate::error::Result;

use anyhow::Context as _;
use sqlx::SqlitePool;

const TABLE_BASE_NAME: &str = "markov";

/// Names of the two tables backing one brain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrainTables {
    pub seeds: String,
    pub transitions: String,
}

impl BrainTables {
    pub fn for_tenant(tenant_id: &str) -> Self {
        Self {
            seeds: format!("{tenant_id}{TABLE_BASE_NAME}_seed"),
            transitions: format!("{tenant_id}{TABLE_BASE_NAME}_next_states"),
        }
    }

    /// Quoted seed table identifier, safe to splice into SQL.
    pub fn seeds_ident(&self) -> String {
        quote_ident(&self.seeds)
    }

    /// Quoted transition table identifier, safe to splice into SQL.
    pub fn transitions_ident(&self) -> String {
        quote_ident(&self.transitions)
    }

    /// Create both tables if they do not exist yet.
    pub async fn create(&self, pool: &SqlitePool) -> Result<()> {
        let seeds = self.seeds_ident();
        let transitions = self.transitions_ident();
        let index = quote_ident(&format!("idx_{}_seed", self.transitions));
        let schema = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {seeds} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seed TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS {transitions} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL UNIQUE,
                next_token TEXT NOT NULL,
                count INTEGER NOT NULL CHECK (count > 0),
                seed_id INTEGER NOT NULL,
                FOREIGN KEY (seed_id) REFERENCES {seeds} (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS {index} ON {transitions} (seed_id, next_token);
            "#
        );

        sqlx::raw_sql(&schema)
            .execute(pool)
            .await
            .with_context(|| format!("failed to create tables for brain '{}'", self.seeds))?;
        Ok(())
    }

    /// Drop both tables.
    pub async fn drop_tables(&self, pool: &SqlitePool) -> Result<()> {
        let statement = format!(
            "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {};",
            self.transitions_ident(),
            self.seeds_ident()
        );
        sqlx::raw_sql(&statement)
            .execute(pool)
            .await
            .with_context(|| format!("failed to drop brain tables '{}'", self.seeds))?;
        Ok(())
    }

    /// Delete every row while keeping both tables. Transitions go first so the
    /// foreign key never dangles mid-statement.
    pub(crate) fn clear_statement(&self) -> String {
        format!(
            "DELETE FROM {}; DELETE FROM {};",
            self.transitions_ident(),
            self.seeds_ident()
        )
    }

    /// Whether the seed table exists in the database.
    pub async fn exists(&self, pool: &SqlitePool) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(&self.seeds)
        .fetch_one(pool)
        .await
        .context("failed to inspect sqlite_master")?;
        Ok(exists)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
