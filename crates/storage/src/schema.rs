//! Schema provisioning: advisory lock, table creation, version bookkeeping
//! (SPEC §4.1 "Schema provisioning"), grounded directly on the reference's
//! `database.py` DDL (tables, CHECK constraints, the `deleteaudio()` trigger).

use sqlx::{Executor, PgPool};

use crate::error::{StorageError, StorageResult};

/// The advisory lock key used to serialise schema provisioning across
/// workers/replicas racing to open the store at the same time.
const ADVISORY_LOCK_KEY: i64 = 0x7472_6e73; // "trns" as an i64, arbitrary but fixed

/// Current schema version this binary expects. A store opened by a newer
/// major version refuses to start (SPEC §4.1 "forward compatibility is not
/// assumed").
pub const SCHEMA_VERSION: i32 = 1;

pub async fn provision(pool: &PgPool, schema: &str) -> StorageResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ADVISORY_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let schema_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
    )
    .bind(schema)
    .fetch_one(&mut *tx)
    .await?;

    if !schema_exists {
        tx.execute(format!("CREATE SCHEMA {schema}").as_str())
            .await?;
        create_all_tables(&mut tx, schema).await?;
        insert_metadata_row(&mut tx, schema).await?;
    } else {
        let metadata_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = 'metadata')",
        )
        .bind(schema)
        .fetch_one(&mut *tx)
        .await?;

        let any_table_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1)",
        )
        .bind(schema)
        .fetch_one(&mut *tx)
        .await?;

        if !metadata_exists {
            if any_table_exists {
                return Err(StorageError::Inconsistent(format!(
                    "schema {schema} has tables but no metadata row; refusing to guess"
                )));
            }
            create_all_tables(&mut tx, schema).await?;
            insert_metadata_row(&mut tx, schema).await?;
        } else {
            check_version(&mut tx, schema).await?;
            ensure_all_tables_exist(&mut tx, schema).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

async fn check_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schema: &str,
) -> StorageResult<()> {
    let version: Option<i32> = sqlx::query_scalar(&format!(
        "SELECT data->>'version' FROM {schema}.metadata WHERE topic = 'schema_version'"
    ))
    .fetch_optional(&mut **tx)
    .await?
    .map(|v: String| v.parse().unwrap_or(0));

    if let Some(stored) = version {
        if stored > SCHEMA_VERSION {
            return Err(StorageError::Inconsistent(format!(
                "store was opened by a newer schema version ({stored} > {SCHEMA_VERSION}); refusing to start"
            )));
        }
    }
    Ok(())
}

async fn ensure_all_tables_exist(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schema: &str,
) -> StorageResult<()> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2)",
        )
        .bind(schema)
        .bind(*table)
        .fetch_one(&mut **tx)
        .await?;
        if !exists {
            create_all_tables(tx, schema).await?;
            break;
        }
    }
    Ok(())
}

const REQUIRED_TABLES: &[&str] = &[
    "metadata",
    "users",
    "local_accounts",
    "oidc_accounts",
    "ldap_accounts",
    "runners",
    "job_settings",
    "jobs",
    "transcripts",
    "token_secrets",
    "site_data",
];

async fn insert_metadata_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schema: &str,
) -> StorageResult<()> {
    sqlx::query(&format!(
        "INSERT INTO {schema}.metadata (topic, data) VALUES ('schema_version', $1) \
         ON CONFLICT (topic) DO NOTHING"
    ))
    .bind(serde_json::json!({ "version": SCHEMA_VERSION }))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// DDL mirrors the reference's table shapes (`database.py`): `jobs`'s CHECK
/// constraints encode the state-machine invariants instead of trusting
/// application code, and the `deleteaudio()` trigger unlinks the large
/// object whenever a job row is deleted.
async fn create_all_tables(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schema: &str,
) -> StorageResult<()> {
    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.metadata (
                topic text PRIMARY KEY,
                data jsonb NOT NULL
            )"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.users (
                id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                accepted_terms_version text,
                last_login timestamptz NOT NULL DEFAULT now()
            )"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.site_data (
                key text PRIMARY KEY,
                value jsonb NOT NULL
            )"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.token_secrets (
                name text NOT NULL,
                user_id bigint NOT NULL,
                secret text NOT NULL DEFAULT md5(random()::text),
                PRIMARY KEY (name, user_id),
                FOREIGN KEY (user_id) REFERENCES {schema}.users (id) ON DELETE CASCADE
            )"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.local_accounts (
                id bigint PRIMARY KEY,
                email text UNIQUE NOT NULL,
                password_hash text NOT NULL,
                is_admin boolean NOT NULL DEFAULT false,
                is_verified boolean NOT NULL DEFAULT false,
                provisioned boolean NOT NULL DEFAULT false,
                FOREIGN KEY (id) REFERENCES {schema}.users (id) ON DELETE CASCADE
            )"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.oidc_accounts (
                id bigint PRIMARY KEY,
                iss text NOT NULL,
                sub text NOT NULL,
                email text NOT NULL,
                UNIQUE (iss, sub),
                FOREIGN KEY (id) REFERENCES {schema}.users (id) ON DELETE CASCADE
            )"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.ldap_accounts (
                id bigint PRIMARY KEY,
                provider_name text NOT NULL,
                uid text NOT NULL,
                email text NOT NULL,
                UNIQUE (provider_name, uid),
                FOREIGN KEY (id) REFERENCES {schema}.users (id) ON DELETE CASCADE
            )"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.runners (
                id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                token_hash text UNIQUE NOT NULL CHECK (length(token_hash) = 43)
            )"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.job_settings (
                id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                user_id bigint NOT NULL,
                is_default boolean NOT NULL DEFAULT false,
                settings jsonb NOT NULL,
                FOREIGN KEY (user_id) REFERENCES {schema}.users (id) ON DELETE CASCADE
            )"
        )
        .as_str(),
    )
    .await?;
    tx.execute(
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS job_settings_one_default_per_user \
             ON {schema}.job_settings (user_id) WHERE is_default"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.jobs (
                id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                user_id bigint NOT NULL,
                job_settings_id bigint,
                creation_timestamp timestamptz NOT NULL DEFAULT now(),
                file_name text NOT NULL,
                aborting boolean NOT NULL DEFAULT false,
                audio_oid oid,
                finish_timestamp timestamptz,
                runner_id bigint,
                runner_name text,
                runner_version text,
                runner_git_hash text,
                runner_source_url text,
                downloaded boolean,
                error_msg text,
                FOREIGN KEY (user_id) REFERENCES {schema}.users (id) ON DELETE CASCADE,
                FOREIGN KEY (job_settings_id) REFERENCES {schema}.job_settings (id) ON DELETE SET NULL,
                FOREIGN KEY (runner_id) REFERENCES {schema}.runners (id) ON DELETE SET NULL,
                CONSTRAINT only_finished_job_is_succeeded_or_failed CHECK (
                    finish_timestamp IS NOT NULL
                    OR (downloaded IS NULL AND error_msg IS NULL)
                ),
                CONSTRAINT either_no_or_all_runner_info_except_runner_id CHECK (
                    (runner_name IS NULL) = (runner_version IS NULL)
                    AND (runner_name IS NULL) = (runner_git_hash IS NULL)
                    AND (runner_name IS NULL) = (runner_source_url IS NULL)
                ),
                CONSTRAINT finished_job_has_no_audio_oid CHECK (
                    finish_timestamp IS NULL OR audio_oid IS NULL
                ),
                CONSTRAINT aborting_job_has_no_audio_oid_and_is_not_finished CHECK (
                    NOT aborting OR (audio_oid IS NULL AND finish_timestamp IS NULL)
                )
            )"
        )
        .as_str(),
    )
    .await?;
    tx.execute(format!("CREATE INDEX IF NOT EXISTS jobs_user_id_idx ON {schema}.jobs (user_id)").as_str())
        .await?;

    tx.execute(
        format!(
            "CREATE OR REPLACE FUNCTION {schema}.deleteaudio() RETURNS trigger AS $$
            BEGIN
                IF OLD.audio_oid IS NOT NULL THEN
                    PERFORM lo_unlink(OLD.audio_oid);
                END IF;
                RETURN OLD;
            END;
            $$ LANGUAGE plpgsql"
        )
        .as_str(),
    )
    .await?;
    tx.execute(
        format!(
            "DROP TRIGGER IF EXISTS deleteaudio_trigger ON {schema}.jobs"
        )
        .as_str(),
    )
    .await?;
    tx.execute(
        format!(
            "CREATE TRIGGER deleteaudio_trigger AFTER DELETE ON {schema}.jobs \
             FOR EACH ROW EXECUTE FUNCTION {schema}.deleteaudio()"
        )
        .as_str(),
    )
    .await?;

    tx.execute(
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.transcripts (
                job_id bigint PRIMARY KEY,
                as_txt text NOT NULL,
                as_srt text NOT NULL,
                as_tsv text NOT NULL,
                as_vtt text NOT NULL,
                as_json jsonb NOT NULL,
                FOREIGN KEY (job_id) REFERENCES {schema}.jobs (id) ON DELETE CASCADE
            )"
        )
        .as_str(),
    )
    .await?;

    Ok(())
}
