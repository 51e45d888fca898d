//! Brain: seed/transition primitives and lifecycle for one tenant.

use crate::brain::schema::BrainTables;
use crate::brain::types::{escape_like, transition_hash, BrainStats, ChainSnapshot, Transition};
use crate::error::Result;

use anyhow::Context as _;
use rand::Rng as _;
use sqlx::{Sqlite, SqlitePool, Transaction};

use std::collections::BTreeMap;
use std::path::Path;

/// Persistent Markov brain for one tenant.
///
/// Holds a handle to the shared pool plus the SQL for its own pair of tables.
/// Every lookup goes straight to the store; nothing is cached in memory.
#[derive(Debug, Clone)]
pub struct Brain {
    tenant_id: String,
    tables: BrainTables,
    queries: Queries,
    pool: SqlitePool,
}

impl Brain {
    /// Open the brain for `tenant_id`, creating its tables on first use.
    pub async fn open(pool: SqlitePool, tenant_id: impl Into<String>) -> Result<Self> {
        let tenant_id = tenant_id.into();
        let tables = BrainTables::for_tenant(&tenant_id);
        tables.create(&pool).await?;

        Ok(Self {
            queries: Queries::new(&tables),
            tenant_id,
            tables,
            pool,
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn tables(&self) -> &BrainTables {
        &self.tables
    }

    pub async fn contains(&self, seed: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(&self.queries.contains_seed)
            .bind(seed)
            .fetch_one(&self.pool)
            .await
            .context("failed to check seed existence")?;
        Ok(exists)
    }

    /// Start a write transaction for many upserts committed once.
    pub async fn begin_batch(&self) -> Result<TrainingBatch<'_>> {
        let transaction = self
            .pool
            .begin()
            .await
            .context("failed to begin training transaction")?;
        Ok(TrainingBatch {
            brain: self,
            transaction,
            written: 0,
        })
    }

    /// Upsert a single transition in its own transaction.
    pub async fn add_transition(&self, seed: &str, next_token: &str, count: i64) -> Result<()> {
        let mut batch = self.begin_batch().await?;
        batch.add_transition(seed, next_token, count).await?;
        batch.commit().await?;
        Ok(())
    }

    /// All outgoing edges of `seed`, in insertion order. Empty if unknown.
    pub async fn get_transitions(&self, seed: &str) -> Result<Vec<Transition>> {
        let transitions = sqlx::query_as::<_, Transition>(&self.queries.transitions_for_seed)
            .bind(seed)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch transitions")?;
        Ok(transitions)
    }

    /// A uniformly random seed, or `None` if the brain is empty.
    pub async fn get_random_seed(&self) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(&self.queries.random_seed)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch random seed")?;
        Ok(row.map(|(seed,)| seed))
    }

    /// A random seed that starts or ends with `partial`.
    ///
    /// Prefix and suffix matching are tried in random order; `None` means
    /// neither direction matched.
    pub async fn get_fuzzy_seed(&self, partial: &str, separator: &str) -> Result<Option<String>> {
        let partial = escape_like(partial);
        let separator = escape_like(separator);
        let prefix = format!("{partial}{separator}_%");
        let suffix = format!("%_{separator}{partial}");

        let patterns = if rand::rng().random_bool(0.5) {
            [prefix, suffix]
        } else {
            [suffix, prefix]
        };

        for pattern in &patterns {
            let row: Option<(String,)> = sqlx::query_as(&self.queries.seed_like)
                .bind(pattern)
                .fetch_optional(&self.pool)
                .await
                .context("failed to run fuzzy seed search")?;
            if let Some((seed,)) = row {
                return Ok(Some(seed));
            }
        }

        Ok(None)
    }

    /// A random seed ending with `partial_seed` that has a transition to
    /// `forward_token`. An empty `partial_seed` matches any seed.
    pub async fn get_previous_state(
        &self,
        partial_seed: &str,
        forward_token: &str,
        separator: &str,
    ) -> Result<Option<String>> {
        let pattern = if partial_seed.is_empty() {
            "%".to_string()
        } else {
            format!("%_{}{}", escape_like(separator), escape_like(partial_seed))
        };

        let row: Option<(String,)> = sqlx::query_as(&self.queries.previous_state)
            .bind(&pattern)
            .bind(forward_token)
            .fetch_optional(&self.pool)
            .await
            .context("failed to search for previous state")?;
        Ok(row.map(|(seed,)| seed))
    }

    /// Replace this brain's contents with a snapshot copy of `other`.
    pub async fn clone_from(&self, other: &Brain) -> Result<()> {
        if other.tables == self.tables {
            return Ok(());
        }

        let statement = format!(
            "{clear}
             INSERT INTO {dst_seeds} (id, seed) SELECT id, seed FROM {src_seeds};
             INSERT INTO {dst_transitions} (hash, next_token, count, seed_id)
                 SELECT hash, next_token, count, seed_id FROM {src_transitions};",
            clear = self.tables.clear_statement(),
            dst_seeds = self.tables.seeds_ident(),
            src_seeds = other.tables.seeds_ident(),
            dst_transitions = self.tables.transitions_ident(),
            src_transitions = other.tables.transitions_ident(),
        );

        let mut transaction = self
            .pool
            .begin()
            .await
            .context("failed to begin clone transaction")?;
        sqlx::raw_sql(&statement)
            .execute(&mut *transaction)
            .await
            .with_context(|| {
                format!("failed to clone brain '{}' into '{}'", other.tenant_id, self.tenant_id)
            })?;
        transaction
            .commit()
            .await
            .context("failed to commit clone transaction")?;

        tracing::info!(
            tenant_id = %self.tenant_id,
            source = %other.tenant_id,
            "brain cloned"
        );
        Ok(())
    }

    /// Delete every seed and transition, keeping the tables.
    pub async fn reset(&self) -> Result<()> {
        let statement = self.tables.clear_statement();
        let mut transaction = self
            .pool
            .begin()
            .await
            .context("failed to begin reset transaction")?;
        sqlx::raw_sql(&statement)
            .execute(&mut *transaction)
            .await
            .context("failed to clear brain tables")?;
        transaction
            .commit()
            .await
            .context("failed to commit reset transaction")?;

        tracing::info!(tenant_id = %self.tenant_id, "brain reset");
        Ok(())
    }

    /// Drop this brain's tables. The handle must not be used afterwards.
    pub async fn remove(&self) -> Result<()> {
        self.tables.drop_tables(&self.pool).await?;
        tracing::info!(tenant_id = %self.tenant_id, "brain removed");
        Ok(())
    }

    /// Every seed, oldest first.
    pub async fn seeds(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(&self.queries.all_seeds)
            .fetch_all(&self.pool)
            .await
            .context("failed to list seeds")?;
        Ok(rows.into_iter().map(|(seed,)| seed).collect())
    }

    pub async fn stats(&self) -> Result<BrainStats> {
        let (seeds, transitions, total_weight): (i64, i64, i64) =
            sqlx::query_as(&self.queries.stats)
                .fetch_one(&self.pool)
                .await
                .context("failed to compute brain stats")?;
        Ok(BrainStats {
            seeds,
            transitions,
            total_weight,
        })
    }

    /// Snapshot the whole chain.
    pub async fn export(&self) -> Result<ChainSnapshot> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(&self.queries.export_rows)
            .fetch_all(&self.pool)
            .await
            .context("failed to export brain")?;

        let mut chain: BTreeMap<String, Vec<(String, i64)>> = BTreeMap::new();
        for (seed, next_token, count) in rows {
            chain.entry(seed).or_default().push((next_token, count));
        }
        Ok(ChainSnapshot { chain })
    }

    /// Merge a snapshot into this brain with the same upsert semantics as
    /// training. Returns the number of transitions written.
    pub async fn import(&self, snapshot: &ChainSnapshot) -> Result<usize> {
        let mut batch = self.begin_batch().await?;
        for (seed, transitions) in &snapshot.chain {
            for (next_token, count) in transitions {
                batch.add_transition(seed, next_token, *count).await?;
            }
        }
        let written = batch.commit().await?;
        tracing::info!(tenant_id = %self.tenant_id, written, "brain imported");
        Ok(written)
    }

    pub async fn export_json(&self, path: &Path) -> Result<()> {
        let snapshot = self.export().await?;
        let json = serde_json::to_string(&snapshot)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write brain export: {}", path.display()))?;
        tracing::info!(
            tenant_id = %self.tenant_id,
            path = %path.display(),
            seeds = snapshot.len(),
            "brain exported"
        );
        Ok(())
    }

    pub async fn import_json(&self, path: &Path) -> Result<usize> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read brain export: {}", path.display()))?;
        let snapshot: ChainSnapshot = serde_json::from_str(&json)?;
        self.import(&snapshot).await
    }
}

/// Open write transaction accumulating transition upserts.
///
/// Nothing is visible to readers until [`TrainingBatch::commit`]; dropping the
/// batch rolls it back.
pub struct TrainingBatch<'a> {
    brain: &'a Brain,
    transaction: Transaction<'static, Sqlite>,
    written: usize,
}

impl TrainingBatch<'_> {
    /// Create the seed if needed, then insert the transition or add `count`
    /// to the existing one.
    pub async fn add_transition(&mut self, seed: &str, next_token: &str, count: i64) -> Result<()> {
        if count < 1 {
            return Err(anyhow::anyhow!(
                "transition count must be positive, got {count} for '{seed}' -> '{next_token}'"
            )
            .into());
        }

        sqlx::query(&self.brain.queries.insert_seed)
            .bind(seed)
            .execute(&mut *self.transaction)
            .await
            .context("failed to insert seed")?;

        sqlx::query(&self.brain.queries.upsert_transition)
            .bind(transition_hash(seed, next_token))
            .bind(next_token)
            .bind(count)
            .bind(seed)
            .execute(&mut *self.transaction)
            .await
            .context("failed to upsert transition")?;

        self.written += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Commit every upsert in the batch. Returns how many were written.
    pub async fn commit(self) -> Result<usize> {
        self.transaction
            .commit()
            .await
            .context("failed to commit training batch")?;
        Ok(self.written)
    }
}

/// SQL statements bound to one brain's table names.
#[derive(Debug, Clone)]
struct Queries {
    contains_seed: String,
    insert_seed: String,
    upsert_transition: String,
    transitions_for_seed: String,
    random_seed: String,
    seed_like: String,
    previous_state: String,
    all_seeds: String,
    stats: String,
    export_rows: String,
}

impl Queries {
    fn new(tables: &BrainTables) -> Self {
        let seeds = tables.seeds_ident();
        let transitions = tables.transitions_ident();

        Self {
            contains_seed: format!("SELECT EXISTS(SELECT 1 FROM {seeds} WHERE seed = ?)"),
            insert_seed: format!("INSERT OR IGNORE INTO {seeds} (seed) VALUES (?)"),
            upsert_transition: format!(
                "INSERT INTO {transitions} (hash, next_token, count, seed_id)
                 VALUES (?, ?, ?, (SELECT id FROM {seeds} WHERE seed = ?))
                 ON CONFLICT(hash) DO UPDATE SET count = count + excluded.count"
            ),
            transitions_for_seed: format!(
                "SELECT t.next_token, t.count
                 FROM {transitions} t
                 JOIN {seeds} s ON s.id = t.seed_id
                 WHERE s.seed = ?
                 ORDER BY t.id ASC"
            ),
            random_seed: format!("SELECT seed FROM {seeds} ORDER BY random() LIMIT 1"),
            seed_like: format!(
                r"SELECT seed FROM {seeds} WHERE seed LIKE ? ESCAPE '\' ORDER BY random() LIMIT 1"
            ),
            previous_state: format!(
                r"SELECT s.seed
                 FROM {seeds} s
                 WHERE s.seed LIKE ? ESCAPE '\'
                   AND EXISTS(
                       SELECT 1 FROM {transitions} t
                       WHERE t.seed_id = s.id AND t.next_token = ?
                   )
                 ORDER BY random()
                 LIMIT 1"
            ),
            all_seeds: format!("SELECT seed FROM {seeds} ORDER BY id ASC"),
            stats: format!(
                "SELECT
                    (SELECT COUNT(*) FROM {seeds}),
                    (SELECT COUNT(*) FROM {transitions}),
                    (SELECT COALESCE(SUM(count), 0) FROM {transitions})"
            ),
            export_rows: format!(
                "SELECT s.seed, t.next_token, t.count
                 FROM {seeds} s
                 JOIN {transitions} t ON t.seed_id = s.id
                 ORDER BY s.id ASC, t.id ASC"
            ),
        }
    }
}
