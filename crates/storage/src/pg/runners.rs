//! Runner identity row access (SPEC §3 "Runner identity", §4.1).

use sqlx::Row;
use transcriptord_core::{RunnerId, RunnerIdentity};

use super::PgDurableStore;
use crate::error::StorageResult;

impl PgDurableStore {
    pub(crate) async fn create_runner_identity_impl(
        &self,
        token_hash: &str,
    ) -> StorageResult<RunnerIdentity> {
        let schema = self.schema();
        let id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {schema}.runners (token_hash) VALUES ($1) RETURNING id"
        ))
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(RunnerIdentity {
            id: RunnerId::new(id),
            token_hash: token_hash.to_string(),
        })
    }

    pub(crate) async fn get_runner_by_token_hash_impl(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<RunnerIdentity>> {
        let schema = self.schema();
        let row = sqlx::query(&format!(
            "SELECT id, token_hash FROM {schema}.runners WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(RunnerIdentity {
                id: RunnerId::new(row.try_get("id")?),
                token_hash: row.try_get("token_hash")?,
            })
        })
        .transpose()
        .map_err(|e: sqlx::Error| e.into())
    }
}
