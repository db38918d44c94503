//! The job lifecycle manager (SPEC §4.5), grounded on
//! `examples/original_source/project_W/routers/jobs.py`'s submit_job/
//! default_settings/count/top_k handlers.

use std::sync::Arc;

use transcriptord_cache::EphemeralStore;
use transcriptord_core::{DomainEvent, EventKind, Job, JobId, JobSettings, Rendered, TranscriptFormat, UserId};
use transcriptord_storage::{AudioStream, DurableStore};

use crate::dispatcher::Dispatcher;
use crate::error::{EngineError, EngineResult};

pub struct JobLifecycleManager {
    durable: Arc<dyn DurableStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    dispatcher: Dispatcher,
}

fn validate_content_type(content_type: &str) -> EngineResult<()> {
    let top_level = content_type.split('/').next().unwrap_or("");
    if top_level != "audio" && top_level != "video" {
        return Err(EngineError::validation(format!(
            "unsupported content type: {content_type}"
        )));
    }
    Ok(())
}

impl JobLifecycleManager {
    pub fn new(
        durable: Arc<dyn DurableStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            durable,
            ephemeral,
            dispatcher,
        }
    }

    /// Validates content type, writes the audio blob, enqueues at priority
    /// 0, triggers immediate assignment, and emits `job_created` (SPEC
    /// §4.5).
    pub async fn submit_job(
        &self,
        user_id: UserId,
        file_name: &str,
        content_type: &str,
        settings_id: Option<transcriptord_core::SettingsId>,
        audio: AudioStream,
    ) -> EngineResult<JobId> {
        validate_content_type(content_type)?;
        let job_id = self
            .durable
            .add_job(user_id, file_name, settings_id, audio)
            .await?;
        self.ephemeral.enqueue_job(job_id, 0.0).await?;
        self.dispatcher.try_assign(job_id, user_id).await?;
        self.ephemeral
            .publish(DomainEvent::new(user_id, job_id, EventKind::JobCreated))
            .await?;
        Ok(job_id)
    }

    pub async fn get_job(&self, caller: UserId, is_admin: bool, job_id: JobId) -> EngineResult<Job> {
        self.owned_job_or_admin(caller, is_admin, job_id).await
    }

    /// Only the owner (or an admin) may abort (SPEC §4.5). Queued-and-
    /// unassigned jobs are failed immediately; assigned/in-progress jobs
    /// are flagged for the runner to observe on its next heartbeat.
    pub async fn abort_job(&self, caller: UserId, is_admin: bool, job_id: JobId) -> EngineResult<()> {
        let job = self.owned_job_or_admin(caller, is_admin, job_id).await?;
        if job.is_finished() {
            return Err(EngineError::conflict("job already finished"));
        }

        self.durable.mark_aborting(job_id).await?;

        if self.ephemeral.queue_contains_job(job_id).await?
            && self.ephemeral.get_in_process_job(job_id).await?.is_none()
        {
            // Still queued, never assigned: fail it outright, there is no
            // runner to observe the abort flag.
            self.ephemeral.remove_job_from_queue(job_id).await?;
            self.durable
                .finish_failed(job_id, "Job was aborted", None)
                .await?;
        } else {
            self.ephemeral.abort_in_process_job(job_id).await?;
        }

        self.ephemeral
            .publish(DomainEvent::new(job.user_id, job_id, EventKind::JobUpdated))
            .await?;
        Ok(())
    }

    /// Refuses if any named job is unfinished (SPEC §4.5).
    pub async fn delete_jobs(&self, user_id: UserId, job_ids: &[JobId]) -> EngineResult<()> {
        self.durable.delete_jobs(user_id, job_ids).await?;
        for job_id in job_ids {
            self.ephemeral
                .publish(DomainEvent::new(user_id, *job_id, EventKind::JobDeleted))
                .await?;
        }
        Ok(())
    }

    pub async fn get_transcript(
        &self,
        user_id: UserId,
        job_id: JobId,
        format: TranscriptFormat,
    ) -> EngineResult<Rendered> {
        self.durable
            .get_transcript_and_mark_downloaded(user_id, job_id, format)
            .await?
            .ok_or(EngineError::NotFound)
    }

    pub async fn list_jobs(&self, user_id: UserId, offset: i64, limit: i64) -> EngineResult<Vec<Job>> {
        Ok(self.durable.list_jobs_for_user(user_id, offset, limit).await?)
    }

    pub async fn count_jobs(&self, user_id: UserId) -> EngineResult<i64> {
        Ok(self.durable.count_jobs_for_user(user_id).await?)
    }

    pub async fn get_default_settings(&self, user_id: UserId) -> EngineResult<JobSettings> {
        Ok(self.durable.get_or_create_default_settings(user_id).await?)
    }

    pub async fn upsert_settings(&self, settings: JobSettings) -> EngineResult<JobSettings> {
        settings.validate()?;
        Ok(self.durable.upsert_settings(settings).await?)
    }

    async fn owned_job_or_admin(&self, caller: UserId, is_admin: bool, job_id: JobId) -> EngineResult<Job> {
        let job = self
            .durable
            .get_job_by_id(job_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        if job.user_id != caller && !is_admin {
            return Err(EngineError::forbidden("not the job owner"));
        }
        Ok(job)
    }
}

#[cfg(test)]
#[path = "job_lifecycle_tests.rs"]
mod tests;
