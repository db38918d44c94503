//! Postgres-backed [`DurableStore`] implementation.

mod cleanup;
mod durable_store_impl;
mod jobs;
mod runners;
mod settings;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::StorageResult;
use crate::schema;

/// Connection parameters for the durable store (SPEC §6 "Configuration
/// surface" `database` section).
#[derive(Debug, Clone)]
pub struct DurableStoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub schema: String,
    /// Chunk size used both for writing and reading the audio large object
    /// (SPEC §4.1, design default 10 MiB).
    pub audio_chunk_bytes: usize,
}

impl DurableStoreConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.dbname
        )
    }
}

/// The production [`crate::DurableStore`]: a connection pool plus the
/// provisioned schema name and configured chunk size.
pub struct PgDurableStore {
    pool: PgPool,
    schema: String,
    audio_chunk_bytes: usize,
}

impl PgDurableStore {
    /// Connects, provisions the schema if needed (SPEC §4.1), and returns a
    /// ready-to-use store. Idempotent: calling this again with the same
    /// config on an already-open pool is cheap (sqlx pools are cloneable
    /// handles), matching the application context's idempotent `open()`.
    pub async fn open(config: &DurableStoreConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(&config.connection_string())
            .await?;
        schema::provision(&pool, &config.schema).await?;
        Ok(Self {
            pool,
            schema: config.schema.clone(),
            audio_chunk_bytes: config.audio_chunk_bytes,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn schema(&self) -> &str {
        &self.schema
    }
}
