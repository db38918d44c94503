//! Wires [`PgDurableStore`]'s inherent `*_impl` methods (split by concern
//! across `jobs.rs`/`settings.rs`/`runners.rs`/`cleanup.rs`) up to the single
//! [`DurableStore`] trait Rust allows per type.

use async_trait::async_trait;
use transcriptord_core::{
    Job, JobId, JobSettings, Rendered, RunnerIdentity, RunnerSnapshot, SettingsId, Transcript,
    TranscriptFormat, UserId,
};

use super::PgDurableStore;
use crate::error::StorageResult;
use crate::store::DurableStore;
use crate::types::{AudioStream, CleanupReport, UnfinishedJob, UsersCleanupOutcome};

#[async_trait]
impl DurableStore for PgDurableStore {
    async fn add_job(
        &self,
        user_id: UserId,
        file_name: &str,
        settings_id: Option<SettingsId>,
        audio: AudioStream,
    ) -> StorageResult<JobId> {
        self.add_job_impl(user_id, file_name, settings_id, audio).await
    }

    async fn get_job_by_id(&self, job_id: JobId) -> StorageResult<Option<Job>> {
        self.get_job_by_id_impl(job_id).await
    }

    async fn get_job_audio(&self, job_id: JobId) -> StorageResult<Option<AudioStream>> {
        self.get_job_audio_impl(job_id).await
    }

    async fn mark_aborting(&self, job_id: JobId) -> StorageResult<()> {
        self.mark_aborting_impl(job_id).await
    }

    async fn finish_successful(
        &self,
        job_id: JobId,
        runner: RunnerSnapshot,
        transcript: Transcript,
    ) -> StorageResult<()> {
        self.finish_successful_impl(job_id, runner, transcript).await
    }

    async fn finish_failed(
        &self,
        job_id: JobId,
        error_msg: &str,
        runner: Option<RunnerSnapshot>,
    ) -> StorageResult<()> {
        self.finish_failed_impl(job_id, error_msg, runner).await
    }

    async fn get_transcript_and_mark_downloaded(
        &self,
        user_id: UserId,
        job_id: JobId,
        format: TranscriptFormat,
    ) -> StorageResult<Option<Rendered>> {
        self.get_transcript_and_mark_downloaded_impl(user_id, job_id, format).await
    }

    async fn get_all_unfinished_jobs(&self) -> StorageResult<Vec<UnfinishedJob>> {
        self.get_all_unfinished_jobs_impl().await
    }

    async fn list_jobs_for_user(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> StorageResult<Vec<Job>> {
        self.list_jobs_for_user_impl(user_id, offset, limit).await
    }

    async fn count_jobs_for_user(&self, user_id: UserId) -> StorageResult<i64> {
        self.count_jobs_for_user_impl(user_id).await
    }

    async fn delete_jobs(&self, user_id: UserId, job_ids: &[JobId]) -> StorageResult<()> {
        self.delete_jobs_impl(user_id, job_ids).await
    }

    async fn get_or_create_default_settings(&self, user_id: UserId) -> StorageResult<JobSettings> {
        self.get_or_create_default_settings_impl(user_id).await
    }

    async fn upsert_settings(&self, settings: JobSettings) -> StorageResult<JobSettings> {
        self.upsert_settings_impl(settings).await
    }

    async fn list_settings(&self, user_id: UserId) -> StorageResult<Vec<JobSettings>> {
        self.list_settings_impl(user_id).await
    }

    async fn create_runner_identity(&self, token_hash: &str) -> StorageResult<RunnerIdentity> {
        self.create_runner_identity_impl(token_hash).await
    }

    async fn get_runner_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<RunnerIdentity>> {
        self.get_runner_by_token_hash_impl(token_hash).await
    }

    async fn run_general_cleanup(&self) -> StorageResult<CleanupReport> {
        self.run_general_cleanup_impl().await
    }

    async fn run_jobs_cleanup(&self, retention_days: Option<u32>) -> StorageResult<CleanupReport> {
        self.run_jobs_cleanup_impl(retention_days).await
    }

    async fn run_users_cleanup(
        &self,
        retention_days: Option<u32>,
    ) -> StorageResult<UsersCleanupOutcome> {
        self.run_users_cleanup_impl(retention_days).await
    }
}
