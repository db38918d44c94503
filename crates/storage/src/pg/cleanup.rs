//! Scheduled maintenance tasks (SPEC §4.1 "Cleanup"), grounded on
//! `database.py`'s `general_cleanup`/`job_cleanup`/`user_cleanup`. Each task
//! is guarded by its own "last ran" timestamp stashed in the `cleanup` topic
//! of the `metadata` table, so a task that runs more often than every 24h is
//! a no-op rather than wasted work.

use chrono::{DateTime, Duration, Utc};
use transcriptord_core::UserId;

use super::PgDurableStore;
use crate::error::StorageResult;
use crate::types::{CleanupReport, RetentionWarningKind, UserRetentionWarning, UsersCleanupOutcome};

const MIN_INTERVAL: Duration = Duration::hours(24);

async fn last_ran(
    pool: &sqlx::PgPool,
    schema: &str,
    field: &str,
) -> StorageResult<Option<DateTime<Utc>>> {
    let value: Option<serde_json::Value> = sqlx::query_scalar(&format!(
        "SELECT data->$1 FROM {schema}.metadata WHERE topic = 'cleanup'"
    ))
    .bind(field)
    .fetch_optional(pool)
    .await?
    .flatten();
    Ok(value
        .and_then(|v| v.as_str().map(str::to_string))
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

async fn record_ran(pool: &sqlx::PgPool, schema: &str, field: &str, at: DateTime<Utc>) -> StorageResult<()> {
    sqlx::query(&format!(
        "INSERT INTO {schema}.metadata (topic, data) VALUES ('cleanup', jsonb_build_object($1, $2::text)) \
         ON CONFLICT (topic) DO UPDATE SET data = {schema}.metadata.data || jsonb_build_object($1, $2::text)"
    ))
    .bind(field)
    .bind(at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

impl PgDurableStore {
    pub(crate) async fn run_general_cleanup_impl(&self) -> StorageResult<CleanupReport> {
        let schema = self.schema();
        let now = Utc::now();
        if let Some(last) = last_ran(&self.pool, schema, "general_last_cleanup").await? {
            if now - last < MIN_INTERVAL {
                tracing::info!("general cleanup already ran within the last 24h, skipping");
                return Ok(CleanupReport::skipped());
            }
        }

        tracing::info!("cleaning up orphaned large objects");
        let unlinked = sqlx::query(&format!(
            "SELECT lo_unlink(lo.oid) FROM pg_largeobject_metadata lo, pg_roles roles \
             WHERE roles.rolname = current_user AND lo.lomowner = roles.oid \
             AND NOT EXISTS (SELECT 1 FROM {schema}.jobs WHERE audio_oid = lo.oid)"
        ))
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::info!("cleaning up orphaned job settings rows");
        let orphaned_settings = sqlx::query(&format!(
            "DELETE FROM {schema}.job_settings job_settings WHERE NOT is_default \
             AND NOT EXISTS (SELECT 1 FROM {schema}.jobs WHERE job_settings_id = job_settings.id)"
        ))
        .execute(&self.pool)
        .await?
        .rows_affected();

        record_ran(&self.pool, schema, "general_last_cleanup", now).await?;
        let total = unlinked + orphaned_settings;
        tracing::info!(rows_affected = total, "general cleanup complete");
        Ok(CleanupReport::ran(total))
    }

    pub(crate) async fn run_jobs_cleanup_impl(
        &self,
        retention_days: Option<u32>,
    ) -> StorageResult<CleanupReport> {
        let Some(retention_days) = retention_days else {
            return Ok(CleanupReport::skipped());
        };
        let schema = self.schema();
        let now = Utc::now();
        if let Some(last) = last_ran(&self.pool, schema, "jobs_last_cleanup").await? {
            if now - last < MIN_INTERVAL {
                tracing::info!("job cleanup already ran within the last 24h, skipping");
                return Ok(CleanupReport::skipped());
            }
        }

        tracing::info!(retention_days, "cleaning up finished jobs past retention");
        let deleted = sqlx::query(&format!(
            "DELETE FROM {schema}.jobs \
             WHERE finish_timestamp IS NOT NULL AND finish_timestamp < NOW() - make_interval(days => $1)"
        ))
        .bind(retention_days as i32)
        .execute(&self.pool)
        .await?
        .rows_affected();

        record_ran(&self.pool, schema, "jobs_last_cleanup", now).await?;
        tracing::info!(rows_affected = deleted, "job cleanup complete");
        Ok(CleanupReport::ran(deleted))
    }

    pub(crate) async fn run_users_cleanup_impl(
        &self,
        retention_days: Option<u32>,
    ) -> StorageResult<UsersCleanupOutcome> {
        let Some(retention_days) = retention_days else {
            return Ok(UsersCleanupOutcome::default());
        };
        let schema = self.schema();
        let now = Utc::now();
        if let Some(last) = last_ran(&self.pool, schema, "users_last_cleanup").await? {
            if now - last < MIN_INTERVAL {
                tracing::info!("user cleanup already ran within the last 24h, skipping");
                return Ok(UsersCleanupOutcome::default());
            }
        }

        tracing::info!(retention_days, "cleaning up users past login retention");
        let retention_days = retention_days as i64;
        let mut warnings = Vec::new();
        warnings.extend(
            self.retention_warning_emails(retention_days - 31, retention_days - 30, RetentionWarningKind::ThirtyDays)
                .await?,
        );
        warnings.extend(
            self.retention_warning_emails(retention_days - 8, retention_days - 7, RetentionWarningKind::SevenDays)
                .await?,
        );

        let deleted = sqlx::query(&format!(
            "DELETE FROM {schema}.users users WHERE users.last_login < NOW() - make_interval(days => $1) \
             AND NOT EXISTS ( \
                SELECT 1 FROM {schema}.local_accounts la WHERE la.id = users.id AND la.provisioned \
             )"
        ))
        .bind(retention_days as i32)
        .execute(&self.pool)
        .await?
        .rows_affected();

        record_ran(&self.pool, schema, "users_last_cleanup", now).await?;
        tracing::info!(rows_affected = deleted, "user cleanup complete");
        Ok(UsersCleanupOutcome {
            report: CleanupReport::ran(deleted),
            warnings,
        })
    }

    /// Users whose days-since-last-login falls in `[begin, end]` days,
    /// excluding provisioned local accounts, across all three account kinds.
    async fn retention_warning_emails(
        &self,
        begin_days: i64,
        end_days: i64,
        kind: RetentionWarningKind,
    ) -> StorageResult<Vec<UserRetentionWarning>> {
        let schema = self.schema();
        let rows = sqlx::query_as::<_, (i64, String)>(&format!(
            "SELECT users.id, la.email FROM {schema}.users users, {schema}.local_accounts la \
             WHERE users.id = la.id AND NOW() - users.last_login \
                 BETWEEN make_interval(days => $1) AND make_interval(days => $2) \
             AND NOT la.provisioned \
             UNION \
             SELECT users.id, oa.email FROM {schema}.users users, {schema}.oidc_accounts oa \
             WHERE users.id = oa.id AND NOW() - users.last_login \
                 BETWEEN make_interval(days => $1) AND make_interval(days => $2) \
             UNION \
             SELECT users.id, lda.email FROM {schema}.users users, {schema}.ldap_accounts lda \
             WHERE users.id = lda.id AND NOW() - users.last_login \
                 BETWEEN make_interval(days => $1) AND make_interval(days => $2)"
        ))
        .bind(begin_days as i32)
        .bind(end_days as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, email)| UserRetentionWarning {
                user_id: UserId::new(id),
                email,
                kind,
            })
            .collect())
    }
}
