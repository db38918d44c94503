//! The durable-store contract (SPEC §4.1).

use async_trait::async_trait;
use transcriptord_core::{Job, JobId, JobSettings, Rendered, RunnerIdentity, RunnerSnapshot,
    SettingsId, Transcript, TranscriptFormat, UserId};

use crate::error::StorageResult;
use crate::types::{AudioStream, UnfinishedJob, UsersCleanupOutcome};
use crate::types::CleanupReport;

/// Everything the engine needs from authoritative storage. Implemented by
/// [`crate::pg::PgDurableStore`] for production and
/// [`crate::memory::InMemoryDurableStore`] for tests.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Streams `audio` into the blob store in fixed-size chunks and inserts
    /// the job row. `settings_id`, if given, must belong to `user_id`.
    async fn add_job(
        &self,
        user_id: UserId,
        file_name: &str,
        settings_id: Option<SettingsId>,
        audio: AudioStream,
    ) -> StorageResult<JobId>;

    async fn get_job_by_id(&self, job_id: JobId) -> StorageResult<Option<Job>>;

    /// `None` if the job has no stored audio (already finished, aborting, or
    /// unknown); `Some(stream)` otherwise.
    async fn get_job_audio(&self, job_id: JobId) -> StorageResult<Option<AudioStream>>;

    /// Sets `aborting=true` and unlinks the audio blob. A no-op if the job is
    /// already finished or already aborting (SPEC §8 idempotence law).
    async fn mark_aborting(&self, job_id: JobId) -> StorageResult<()>;

    async fn finish_successful(
        &self,
        job_id: JobId,
        runner: RunnerSnapshot,
        transcript: Transcript,
    ) -> StorageResult<()>;

    async fn finish_failed(
        &self,
        job_id: JobId,
        error_msg: &str,
        runner: Option<RunnerSnapshot>,
    ) -> StorageResult<()>;

    /// Atomically reads the requested representation and flips `downloaded`
    /// (SPEC §4.1). `None` if the job doesn't belong to `user_id`, isn't
    /// finished, or has no transcript (i.e. it failed).
    async fn get_transcript_and_mark_downloaded(
        &self,
        user_id: UserId,
        job_id: JobId,
        format: TranscriptFormat,
    ) -> StorageResult<Option<Rendered>>;

    async fn get_all_unfinished_jobs(&self) -> StorageResult<Vec<UnfinishedJob>>;

    async fn list_jobs_for_user(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> StorageResult<Vec<Job>>;

    async fn count_jobs_for_user(&self, user_id: UserId) -> StorageResult<i64>;

    /// Refuses (validation error) if any named job is unfinished (SPEC §4.5).
    async fn delete_jobs(&self, user_id: UserId, job_ids: &[JobId]) -> StorageResult<()>;

    async fn get_or_create_default_settings(&self, user_id: UserId) -> StorageResult<JobSettings>;

    async fn upsert_settings(&self, settings: JobSettings) -> StorageResult<JobSettings>;

    async fn list_settings(&self, user_id: UserId) -> StorageResult<Vec<JobSettings>>;

    async fn create_runner_identity(&self, token_hash: &str) -> StorageResult<RunnerIdentity>;

    async fn get_runner_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<RunnerIdentity>>;

    /// Unlinks orphaned blobs and deletes orphaned non-default settings.
    /// Guarded by a 24h "last ran" timestamp (SPEC §4.1).
    async fn run_general_cleanup(&self) -> StorageResult<CleanupReport>;

    /// Deletes finished jobs older than `retention_days`. `None` disables
    /// the task entirely (SPEC §4.1, §6 config).
    async fn run_jobs_cleanup(&self, retention_days: Option<u32>) -> StorageResult<CleanupReport>;

    /// Deletes users whose last login predates `retention_days`, excluding
    /// provisioned users, returning pending warning emails for the caller
    /// to hand to the mail outbox before acting on the deletions.
    async fn run_users_cleanup(
        &self,
        retention_days: Option<u32>,
    ) -> StorageResult<UsersCleanupOutcome>;
}
