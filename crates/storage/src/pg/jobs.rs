//! Job row access (SPEC §4.1), grounded on `database.py`'s job queries.

use chrono::{DateTime, Utc};
use futures_util::stream;
use sqlx::Row;
use transcriptord_core::{
    AudioHandle, Job, JobId, Rendered, RunnerSnapshot, Segment, SettingsId, Transcript,
    TranscriptFormat, UserId,
};

use super::PgDurableStore;
use crate::error::{StorageError, StorageResult};
use crate::types::{AudioStream, UnfinishedJob};

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, sqlx::Error> {
    let runner_name: Option<String> = row.try_get("runner_name")?;
    let runner = runner_name.map(|runner_name| RunnerSnapshot {
        runner_id: row.try_get::<Option<i64>, _>("runner_id").ok().flatten().map(Into::into),
        runner_name,
        runner_version: row.try_get("runner_version").unwrap_or_default(),
        runner_git_hash: row.try_get("runner_git_hash").unwrap_or_default(),
        runner_source_url: row.try_get("runner_source_url").unwrap_or_default(),
    });

    Ok(Job {
        id: JobId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        settings_id: row
            .try_get::<Option<i64>, _>("job_settings_id")?
            .map(Into::into),
        created_at: row.try_get("creation_timestamp")?,
        file_name: row.try_get("file_name")?,
        aborting: row.try_get("aborting")?,
        audio_handle: row.try_get::<Option<i64>, _>("audio_oid")?.map(AudioHandle),
        finish_timestamp: row.try_get("finish_timestamp")?,
        runner,
        downloaded: row.try_get("downloaded")?,
        error_msg: row.try_get("error_msg")?,
    })
}

impl PgDurableStore {
    pub(crate) async fn add_job_impl(
        &self,
        user_id: UserId,
        file_name: &str,
        settings_id: Option<SettingsId>,
        mut audio: AudioStream,
    ) -> StorageResult<JobId> {
        use futures_util::StreamExt;

        let schema = self.schema();
        let mut tx = self.pool.begin().await?;

        if let Some(settings_id) = settings_id {
            let owned: bool = sqlx::query_scalar(&format!(
                "SELECT EXISTS (SELECT 1 FROM {schema}.job_settings WHERE id = $1 AND user_id = $2)"
            ))
            .bind(settings_id.get())
            .bind(user_id.get())
            .fetch_one(&mut *tx)
            .await?;
            if !owned {
                return Err(StorageError::NotFound);
            }
        }

        let oid: i64 = sqlx::query_scalar("SELECT lo_creat(-1)")
            .fetch_one(&mut *tx)
            .await?;

        let mut offset: i64 = 0;
        while let Some(chunk) = audio.next().await {
            let chunk = chunk?;
            sqlx::query("SELECT lo_put($1, $2, $3)")
                .bind(oid)
                .bind(offset)
                .bind(chunk.as_slice())
                .execute(&mut *tx)
                .await?;
            offset += chunk.len() as i64;
        }

        let job_id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {schema}.jobs (user_id, job_settings_id, file_name, audio_oid) \
             VALUES ($1, $2, $3, $4) RETURNING id"
        ))
        .bind(user_id.get())
        .bind(settings_id.map(|s| s.get()))
        .bind(file_name)
        .bind(oid)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(JobId::new(job_id))
    }

    pub(crate) async fn get_job_by_id_impl(&self, job_id: JobId) -> StorageResult<Option<Job>> {
        let schema = self.schema();
        let row = sqlx::query(&format!("SELECT * FROM {schema}.jobs WHERE id = $1"))
            .bind(job_id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_job(&r)).transpose().map_err(Into::into)
    }

    pub(crate) async fn get_job_audio_impl(
        &self,
        job_id: JobId,
    ) -> StorageResult<Option<AudioStream>> {
        let schema = self.schema();
        let oid: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT audio_oid FROM {schema}.jobs WHERE id = $1"
        ))
        .bind(job_id.get())
        .fetch_optional(&self.pool)
        .await?
        .flatten();

        let Some(oid) = oid else {
            return Ok(None);
        };

        let pool = self.pool.clone();
        let chunk_size = self.audio_chunk_bytes as i64;

        // Restartable chunked reader: each poll issues one `lo_get` call at
        // the next offset, so the whole blob is never buffered in memory
        // (SPEC §4.1, §9 "Audio streaming").
        let state = (pool, oid, 0i64, chunk_size);
        let stream = stream::unfold(state, move |(pool, oid, offset, chunk_size)| async move {
            let result: Result<Vec<u8>, sqlx::Error> =
                sqlx::query_scalar("SELECT lo_get($1, $2, $3)")
                    .bind(oid)
                    .bind(offset)
                    .bind(chunk_size)
                    .fetch_one(&pool)
                    .await;

            match result {
                Ok(bytes) if !bytes.is_empty() => {
                    let next_offset = offset + bytes.len() as i64;
                    Some((Ok(bytes), (pool, oid, next_offset, chunk_size)))
                }
                Ok(_) => None,
                Err(err) => Some((Err(StorageError::from(err)), (pool, oid, offset, chunk_size))),
            }
        });

        Ok(Some(Box::pin(stream)))
    }

    pub(crate) async fn mark_aborting_impl(&self, job_id: JobId) -> StorageResult<()> {
        let schema = self.schema();
        let mut tx = self.pool.begin().await?;
        let oid: Option<Option<i64>> = sqlx::query_scalar(&format!(
            "SELECT audio_oid FROM {schema}.jobs \
             WHERE id = $1 AND finish_timestamp IS NULL AND NOT aborting"
        ))
        .bind(job_id.get())
        .fetch_optional(&mut *tx)
        .await?;

        // Already aborting or finished: no-op (SPEC §8 idempotence law).
        let Some(oid) = oid.flatten() else {
            tx.commit().await?;
            return Ok(());
        };

        sqlx::query("SELECT lo_unlink($1)")
            .bind(oid)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "UPDATE {schema}.jobs SET aborting = true, audio_oid = NULL WHERE id = $1"
        ))
        .bind(job_id.get())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn finish_successful_impl(
        &self,
        job_id: JobId,
        runner: RunnerSnapshot,
        transcript: Transcript,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        self.finalize_row(&mut tx, job_id, &runner, None, Utc::now())
            .await?;
        self.insert_transcript(&mut tx, job_id, &transcript).await?;
        self.unlink_audio_if_present(&mut tx, job_id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn finish_failed_impl(
        &self,
        job_id: JobId,
        error_msg: &str,
        runner: Option<RunnerSnapshot>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        let runner_ref = runner.as_ref();
        self.finalize_row(&mut tx, job_id, runner_ref.unwrap_or(&RunnerSnapshot {
            runner_id: None,
            runner_name: String::new(),
            runner_version: String::new(),
            runner_git_hash: String::new(),
            runner_source_url: String::new(),
        }), Some(error_msg), Utc::now())
            .await?;
        self.unlink_audio_if_present(&mut tx, job_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn finalize_row(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: JobId,
        runner: &RunnerSnapshot,
        error_msg: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let schema = self.schema();
        let already_finished: bool = sqlx::query_scalar(&format!(
            "SELECT finish_timestamp IS NOT NULL FROM {schema}.jobs WHERE id = $1"
        ))
        .bind(job_id.get())
        .fetch_optional(&mut **tx)
        .await?
        .unwrap_or(true);
        if already_finished {
            return Err(StorageError::conflict("job is already finished"));
        }

        let runner_name = (!runner.runner_name.is_empty()).then_some(runner.runner_name.as_str());
        sqlx::query(&format!(
            "UPDATE {schema}.jobs SET \
                finish_timestamp = $2, aborting = false, \
                downloaded = CASE WHEN $3::text IS NULL THEN false ELSE NULL END, \
                error_msg = $3, \
                runner_id = $4, runner_name = $5, runner_version = $6, \
                runner_git_hash = $7, runner_source_url = $8 \
             WHERE id = $1"
        ))
        .bind(job_id.get())
        .bind(finished_at)
        .bind(error_msg)
        .bind(runner.runner_id.map(|r| r.get()))
        .bind(runner_name)
        .bind(runner_name.map(|_| runner.runner_version.as_str()))
        .bind(runner_name.map(|_| runner.runner_git_hash.as_str()))
        .bind(runner_name.map(|_| runner.runner_source_url.as_str()))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_transcript(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: JobId,
        transcript: &Transcript,
    ) -> StorageResult<()> {
        let schema = self.schema();
        let as_txt = transcript.render(TranscriptFormat::Text).into_text().unwrap_or_default();
        let as_srt = transcript
            .render(TranscriptFormat::TimeCoded)
            .into_text()
            .unwrap_or_default();
        let as_tsv = transcript
            .render(TranscriptFormat::TabSeparated)
            .into_text()
            .unwrap_or_default();
        let as_vtt = transcript
            .render(TranscriptFormat::Captioned)
            .into_text()
            .unwrap_or_default();
        let as_json = serde_json::to_value(&transcript.segments).unwrap_or_default();

        sqlx::query(&format!(
            "INSERT INTO {schema}.transcripts (job_id, as_txt, as_srt, as_tsv, as_vtt, as_json) \
             VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(job_id.get())
        .bind(as_txt)
        .bind(as_srt)
        .bind(as_tsv)
        .bind(as_vtt)
        .bind(as_json)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn unlink_audio_if_present(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: JobId,
    ) -> StorageResult<()> {
        let schema = self.schema();
        let oid: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT audio_oid FROM {schema}.jobs WHERE id = $1"
        ))
        .bind(job_id.get())
        .fetch_optional(&mut **tx)
        .await?
        .flatten();
        if let Some(oid) = oid {
            sqlx::query("SELECT lo_unlink($1)")
                .bind(oid)
                .execute(&mut **tx)
                .await?;
            sqlx::query(&format!("UPDATE {schema}.jobs SET audio_oid = NULL WHERE id = $1"))
                .bind(job_id.get())
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn get_transcript_and_mark_downloaded_impl(
        &self,
        user_id: UserId,
        job_id: JobId,
        format: TranscriptFormat,
    ) -> StorageResult<Option<Rendered>> {
        let schema = self.schema();
        let column = match format {
            TranscriptFormat::Text => "as_txt",
            TranscriptFormat::TimeCoded => "as_srt",
            TranscriptFormat::TabSeparated => "as_tsv",
            TranscriptFormat::Captioned => "as_vtt",
            TranscriptFormat::Structured => "as_json",
        };

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT t.as_txt, t.as_srt, t.as_tsv, t.as_vtt, t.as_json \
             FROM {schema}.transcripts t JOIN {schema}.jobs j ON j.id = t.job_id \
             WHERE j.user_id = $1 AND t.job_id = $2"
        ))
        .bind(user_id.get())
        .bind(job_id.get())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let rendered = if format == TranscriptFormat::Structured {
            let json: serde_json::Value = row.try_get("as_json")?;
            let segments: Vec<Segment> = serde_json::from_value(json).unwrap_or_default();
            Rendered::Structured(segments)
        } else {
            let text: String = row.try_get(column)?;
            Rendered::Text(text)
        };

        sqlx::query(&format!(
            "UPDATE {schema}.jobs SET downloaded = true WHERE user_id = $1 AND id = $2"
        ))
        .bind(user_id.get())
        .bind(job_id.get())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(rendered))
    }

    pub(crate) async fn get_all_unfinished_jobs_impl(&self) -> StorageResult<Vec<UnfinishedJob>> {
        let schema = self.schema();
        let rows = sqlx::query(&format!(
            "SELECT id, user_id, aborting FROM {schema}.jobs WHERE finish_timestamp IS NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(UnfinishedJob {
                    job_id: JobId::new(row.try_get("id")?),
                    user_id: UserId::new(row.try_get("user_id")?),
                    aborting: row.try_get("aborting")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    pub(crate) async fn list_jobs_for_user_impl(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> StorageResult<Vec<Job>> {
        let schema = self.schema();
        let rows = sqlx::query(&format!(
            "SELECT * FROM {schema}.jobs WHERE user_id = $1 \
             ORDER BY creation_timestamp DESC OFFSET $2 LIMIT $3"
        ))
        .bind(user_id.get())
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(row_to_job)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    pub(crate) async fn count_jobs_for_user_impl(&self, user_id: UserId) -> StorageResult<i64> {
        let schema = self.schema();
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT count(*) FROM {schema}.jobs WHERE user_id = $1"))
                .bind(user_id.get())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub(crate) async fn delete_jobs_impl(
        &self,
        user_id: UserId,
        job_ids: &[JobId],
    ) -> StorageResult<()> {
        let schema = self.schema();
        let ids: Vec<i64> = job_ids.iter().map(|j| j.get()).collect();

        let unfinished: i64 = sqlx::query_scalar(&format!(
            "SELECT count(*) FROM {schema}.jobs \
             WHERE user_id = $1 AND id = ANY($2) AND finish_timestamp IS NULL"
        ))
        .bind(user_id.get())
        .bind(&ids)
        .fetch_one(&self.pool)
        .await?;
        if unfinished > 0 {
            return Err(StorageError::validation(
                "cannot delete jobs that are still unfinished",
            ));
        }

        // Deleting the job row cascades to its transcript and (via the
        // `deleteaudio` trigger) unlinks any residual audio blob.
        sqlx::query(&format!("DELETE FROM {schema}.jobs WHERE user_id = $1 AND id = ANY($2)"))
            .bind(user_id.get())
            .bind(&ids)
            .execute(&self.pool)
            .await?;

        // Sweep settings rows this deletion may have orphaned.
        sqlx::query(&format!(
            "DELETE FROM {schema}.job_settings settings \
             WHERE settings.user_id = $1 AND NOT settings.is_default \
             AND NOT EXISTS (SELECT 1 FROM {schema}.jobs j WHERE j.job_settings_id = settings.id)"
        ))
        .bind(user_id.get())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
