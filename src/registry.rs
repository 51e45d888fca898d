//! Brain registry: maps tenant ids to engines sharing one database.

use crate::brain::Brain;
use crate::chain::Engine;
use crate::config::{validate_chattiness, Config, EngineConfig};
use crate::db::Db;
use crate::error::Result;
use crate::TenantId;

use anyhow::Context as _;
use tokio::sync::{Mutex, RwLock};

use std::collections::HashMap;
use std::sync::Arc;

/// Catalog of registered brains, so tenants survive a restart.
const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS brain_catalog (
    tenant_id TEXT PRIMARY KEY,
    root_tenant_id TEXT,
    chattiness INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Owns the shared connection pool and one engine per tenant.
///
/// `lifecycle` serializes create and remove, so the map's write lock is only
/// held for the insert or removal itself and lookups never wait on a clone.
pub struct BrainRegistry {
    db: Db,
    engine_config: EngineConfig,
    engines: RwLock<HashMap<TenantId, Arc<Engine>>>,
    lifecycle: Mutex<()>,
}

impl BrainRegistry {
    /// Open the database named in `config` and re-open every catalogued brain.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let db = Db::connect(&config.database_path).await?;
        Self::with_db(db, config.engine).await
    }

    /// Build a registry over an already connected database.
    pub async fn with_db(db: Db, engine_config: EngineConfig) -> Result<Self> {
        engine_config.validate()?;
        sqlx::raw_sql(CATALOG_SCHEMA)
            .execute(&db.sqlite)
            .await
            .context("failed to create brain catalog")?;

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT tenant_id, chattiness FROM brain_catalog ORDER BY created_at ASC")
                .fetch_all(&db.sqlite)
                .await
                .context("failed to load brain catalog")?;

        let mut engines = HashMap::with_capacity(rows.len());
        for (tenant_id, chattiness) in rows {
            let brain = Brain::open(db.sqlite.clone(), tenant_id.as_str()).await?;
            let engine = Engine::new(brain, engine_config)?;
            let chattiness = u8::try_from(chattiness)
                .with_context(|| format!("invalid stored chattiness for tenant '{tenant_id}'"))?;
            engine.set_chattiness(chattiness)?;
            engines.insert(TenantId::from(tenant_id), Arc::new(engine));
        }

        tracing::info!(brains = engines.len(), "brain registry loaded");

        Ok(Self {
            db,
            engine_config,
            engines: RwLock::new(engines),
            lifecycle: Mutex::new(()),
        })
    }

    pub async fn get(&self, tenant_id: &str) -> Option<Arc<Engine>> {
        self.engines.read().await.get(tenant_id).cloned()
    }

    pub async fn contains(&self, tenant_id: &str) -> bool {
        self.engines.read().await.contains_key(tenant_id)
    }

    /// Registered tenant ids, sorted.
    pub async fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.engines.read().await.keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// Create a brain for `tenant_id`, optionally seeded with a copy of
    /// `root_tenant_id`'s brain. Returns the existing engine unchanged if the
    /// tenant is already registered.
    pub async fn create(
        &self,
        tenant_id: &str,
        root_tenant_id: Option<&str>,
    ) -> Result<Arc<Engine>> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(existing) = self.get(tenant_id).await {
            return Ok(existing);
        }

        let root = match root_tenant_id {
            Some(root_id) => self.get(root_id).await,
            None => None,
        };

        let brain = Brain::open(self.db.sqlite.clone(), tenant_id).await?;
        match (&root, root_tenant_id) {
            (Some(root), _) => brain.clone_from(root.brain()).await?,
            (None, Some(root_id)) => {
                tracing::warn!(tenant_id, root_tenant_id = root_id, "root brain not registered, starting empty");
            }
            (None, None) => {}
        }

        let engine = Arc::new(Engine::new(brain, self.engine_config)?);

        sqlx::query(
            "INSERT INTO brain_catalog (tenant_id, root_tenant_id, chattiness) VALUES (?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET root_tenant_id = excluded.root_tenant_id,
                                                  chattiness = excluded.chattiness",
        )
        .bind(tenant_id)
        .bind(root.as_ref().map(|root| root.tenant_id()))
        .bind(i64::from(engine.chattiness()))
        .execute(&self.db.sqlite)
        .await
        .context("failed to record brain in catalog")?;

        self.engines
            .write()
            .await
            .insert(TenantId::from(tenant_id), engine.clone());
        tracing::info!(tenant_id, cloned = root.is_some(), "brain created");

        Ok(engine)
    }

    /// Destroy the tenant's brain. Returns false if it was not registered.
    pub async fn remove(&self, tenant_id: &str) -> Result<bool> {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(engine) = self.engines.write().await.remove(tenant_id) else {
            return Ok(false);
        };

        engine.brain().remove().await?;
        sqlx::query("DELETE FROM brain_catalog WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(&self.db.sqlite)
            .await
            .context("failed to remove brain from catalog")?;

        Ok(true)
    }

    /// Update and persist a tenant's chattiness. Returns false if the tenant
    /// is not registered.
    pub async fn set_chattiness(&self, tenant_id: &str, level: u8) -> Result<bool> {
        validate_chattiness(level)?;
        let Some(engine) = self.get(tenant_id).await else {
            return Ok(false);
        };

        engine.set_chattiness(level)?;
        sqlx::query("UPDATE brain_catalog SET chattiness = ? WHERE tenant_id = ?")
            .bind(i64::from(level))
            .bind(tenant_id)
            .execute(&self.db.sqlite)
            .await
            .context("failed to persist chattiness")?;

        Ok(true)
    }

    /// Drop every engine and close the shared pool.
    pub async fn close(self) {
        self.engines.write().await.clear();
        self.db.close().await;
        tracing::info!("brain registry closed");
    }
}

impl std::fmt::Debug for BrainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrainRegistry").finish_non_exhaustive()
    }
}
