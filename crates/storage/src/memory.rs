//! In-memory [`DurableStore`] test double.
//!
//! Exercises the same state-machine invariants as [`crate::pg::PgDurableStore`]
//! (via `transcriptord_core::Job`'s own invariant checks) without a Postgres
//! connection, so the engine and daemon crates can test dispatch, recovery,
//! and the HTTP surface without standing up a database. Not used in
//! production; gated behind no feature flag since its only dependents are
//! `#[cfg(test)]`/dev-dependency code elsewhere in the workspace.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use transcriptord_core::{
    Clock, Job, JobId, JobSettings, Rendered, RunnerId, RunnerIdentity, RunnerSnapshot,
    SettingsId, SystemClock, Transcript, TranscriptFormat, UserId,
};

use crate::error::{StorageError, StorageResult};
use crate::store::DurableStore;
use crate::types::{
    AudioStream, CleanupReport, RetentionWarningKind, UnfinishedJob, UserRetentionWarning,
    UsersCleanupOutcome,
};

const MIN_CLEANUP_INTERVAL: Duration = Duration::hours(24);

/// A user row as far as cleanup/retention bookkeeping is concerned. The full
/// polymorphic `UserIdentity` lives in `transcriptord-core`; this double only
/// needs the fields the "users" cleanup task reads (SPEC §4.1).
#[derive(Debug, Clone)]
struct UserRow {
    email: String,
    last_login: DateTime<Utc>,
    provisioned: bool,
}

#[derive(Default)]
struct Inner {
    next_job_id: i64,
    next_settings_id: i64,
    next_runner_id: i64,
    jobs: HashMap<JobId, Job>,
    audio: HashMap<JobId, Vec<u8>>,
    transcripts: HashMap<JobId, Transcript>,
    settings: HashMap<SettingsId, JobSettings>,
    runners: HashMap<RunnerId, RunnerIdentity>,
    users: HashMap<UserId, UserRow>,
    cleanup_last_ran: HashMap<&'static str, DateTime<Utc>>,
}

/// In-memory double for [`DurableStore`], parameterised by a [`Clock`] so
/// tests can control `created_at`/`finish_timestamp`/cleanup timing without
/// sleeping.
pub struct InMemoryDurableStore<C: Clock = SystemClock> {
    clock: C,
    chunk_bytes: usize,
    inner: Mutex<Inner>,
}

impl InMemoryDurableStore<SystemClock> {
    pub fn new(chunk_bytes: usize) -> Self {
        Self::with_clock(SystemClock, chunk_bytes)
    }
}

impl<C: Clock> InMemoryDurableStore<C> {
    pub fn with_clock(clock: C, chunk_bytes: usize) -> Self {
        Self {
            clock,
            chunk_bytes,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Seeds a user row for "users" cleanup tests. Not part of the
    /// [`DurableStore`] contract (user provisioning is out of scope, §1).
    pub fn seed_user(
        &self,
        user_id: UserId,
        email: impl Into<String>,
        last_login: DateTime<Utc>,
        provisioned: bool,
    ) {
        self.inner.lock().users.insert(
            user_id,
            UserRow {
                email: email.into(),
                last_login,
                provisioned,
            },
        );
    }

    /// Directly inserts a durable job row, bypassing `add_job`'s chunked
    /// write path. Used by recovery tests that need to seed pre-existing
    /// unfinished jobs (SPEC §8 seed scenario 6).
    pub fn seed_job(&self, job: Job) {
        let mut inner = self.inner.lock();
        inner.next_job_id = inner.next_job_id.max(job.id.get() + 1);
        inner.jobs.insert(job.id, job);
    }
}

#[async_trait]
impl<C: Clock> DurableStore for InMemoryDurableStore<C> {
    async fn add_job(
        &self,
        user_id: UserId,
        file_name: &str,
        settings_id: Option<SettingsId>,
        mut audio: AudioStream,
    ) -> StorageResult<JobId> {
        let mut bytes = Vec::new();
        while let Some(chunk) = audio.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        let mut inner = self.inner.lock();
        if let Some(settings_id) = settings_id {
            let owned = inner
                .settings
                .get(&settings_id)
                .is_some_and(|s| s.user_id == user_id);
            if !owned {
                return Err(StorageError::NotFound);
            }
        }

        inner.next_job_id += 1;
        let job_id = JobId::new(inner.next_job_id);
        let job = Job::new_queued(
            job_id,
            user_id,
            settings_id,
            file_name,
            transcriptord_core::AudioHandle(job_id.get()),
            self.clock.now(),
        );
        inner.audio.insert(job_id, bytes);
        inner.jobs.insert(job_id, job);
        Ok(job_id)
    }

    async fn get_job_by_id(&self, job_id: JobId) -> StorageResult<Option<Job>> {
        Ok(self.inner.lock().jobs.get(&job_id).cloned())
    }

    async fn get_job_audio(&self, job_id: JobId) -> StorageResult<Option<AudioStream>> {
        let inner = self.inner.lock();
        let Some(job) = inner.jobs.get(&job_id) else {
            return Ok(None);
        };
        if job.audio_handle.is_none() {
            return Ok(None);
        }
        let Some(bytes) = inner.audio.get(&job_id).cloned() else {
            return Ok(None);
        };
        let chunk_bytes = self.chunk_bytes;
        let chunks: Vec<Result<Vec<u8>, StorageError>> = bytes
            .chunks(chunk_bytes.max(1))
            .map(|c| Ok(c.to_vec()))
            .collect();
        Ok(Some(Box::pin(stream::iter(chunks))))
    }

    async fn mark_aborting(&self, job_id: JobId) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.mark_aborting();
            inner.audio.remove(&job_id);
        }
        Ok(())
    }

    async fn finish_successful(
        &self,
        job_id: JobId,
        runner: RunnerSnapshot,
        transcript: Transcript,
    ) -> StorageResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&job_id).ok_or(StorageError::NotFound)?;
        job.finish_succeeded(runner, now)
            .map_err(|e| StorageError::conflict(e.to_string()))?;
        inner.audio.remove(&job_id);
        inner.transcripts.insert(job_id, transcript);
        Ok(())
    }

    async fn finish_failed(
        &self,
        job_id: JobId,
        error_msg: &str,
        runner: Option<RunnerSnapshot>,
    ) -> StorageResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&job_id).ok_or(StorageError::NotFound)?;
        job.finish_failed(error_msg, runner, now)
            .map_err(|e| StorageError::conflict(e.to_string()))?;
        inner.audio.remove(&job_id);
        Ok(())
    }

    async fn get_transcript_and_mark_downloaded(
        &self,
        user_id: UserId,
        job_id: JobId,
        format: TranscriptFormat,
    ) -> StorageResult<Option<Rendered>> {
        let mut inner = self.inner.lock();
        let owned = inner
            .jobs
            .get(&job_id)
            .is_some_and(|j| j.user_id == user_id);
        if !owned {
            return Ok(None);
        }
        let Some(transcript) = inner.transcripts.get(&job_id).cloned() else {
            return Ok(None);
        };
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.downloaded = Some(true);
        }
        Ok(Some(transcript.render(format)))
    }

    async fn get_all_unfinished_jobs(&self) -> StorageResult<Vec<UnfinishedJob>> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| !j.is_finished())
            .map(|j| UnfinishedJob {
                job_id: j.id,
                user_id: j.user_id,
                aborting: j.aborting,
            })
            .collect())
    }

    async fn list_jobs_for_user(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> StorageResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_jobs_for_user(&self, user_id: UserId) -> StorageResult<i64> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .count() as i64)
    }

    async fn delete_jobs(&self, user_id: UserId, job_ids: &[JobId]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        for job_id in job_ids {
            let Some(job) = inner.jobs.get(job_id) else {
                continue;
            };
            if job.user_id != user_id {
                continue;
            }
            if !job.is_finished() {
                return Err(StorageError::validation(
                    "cannot delete jobs that are still unfinished",
                ));
            }
        }
        for job_id in job_ids {
            if inner.jobs.get(job_id).is_some_and(|j| j.user_id == user_id) {
                inner.jobs.remove(job_id);
                inner.transcripts.remove(job_id);
                inner.audio.remove(job_id);
            }
        }
        let orphaned: Vec<SettingsId> = inner
            .settings
            .values()
            .filter(|s| s.user_id == user_id && !s.is_default)
            .filter(|s| !inner.jobs.values().any(|j| j.settings_id == Some(s.id)))
            .map(|s| s.id)
            .collect();
        for id in orphaned {
            inner.settings.remove(&id);
        }
        Ok(())
    }

    async fn get_or_create_default_settings(&self, user_id: UserId) -> StorageResult<JobSettings> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .settings
            .values()
            .find(|s| s.user_id == user_id && s.is_default)
            .cloned()
        {
            return Ok(existing);
        }
        inner.next_settings_id += 1;
        let settings = JobSettings {
            id: SettingsId::new(inner.next_settings_id),
            user_id,
            is_default: true,
            model: "base".into(),
            language: None,
            align_words: false,
            diarisation: false,
            min_speakers: None,
            max_speakers: None,
            vad_filter: true,
            decoder: Default::default(),
        };
        inner.settings.insert(settings.id, settings.clone());
        Ok(settings)
    }

    async fn upsert_settings(&self, mut settings: JobSettings) -> StorageResult<JobSettings> {
        settings.validate()?;
        let mut inner = self.inner.lock();
        if settings.is_default {
            for existing in inner.settings.values_mut() {
                if existing.user_id == settings.user_id {
                    existing.is_default = false;
                }
            }
        }
        if settings.id.get() == 0 {
            inner.next_settings_id += 1;
            settings.id = SettingsId::new(inner.next_settings_id);
        }
        inner.settings.insert(settings.id, settings.clone());
        Ok(settings)
    }

    async fn list_settings(&self, user_id: UserId) -> StorageResult<Vec<JobSettings>> {
        let mut settings: Vec<JobSettings> = self
            .inner
            .lock()
            .settings
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        settings.sort_by_key(|s| s.id);
        Ok(settings)
    }

    async fn create_runner_identity(&self, token_hash: &str) -> StorageResult<RunnerIdentity> {
        let mut inner = self.inner.lock();
        inner.next_runner_id += 1;
        let identity = RunnerIdentity {
            id: RunnerId::new(inner.next_runner_id),
            token_hash: token_hash.to_string(),
        };
        inner.runners.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn get_runner_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<RunnerIdentity>> {
        Ok(self
            .inner
            .lock()
            .runners
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn run_general_cleanup(&self) -> StorageResult<CleanupReport> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if let Some(last) = inner.cleanup_last_ran.get("general") {
            if now - *last < MIN_CLEANUP_INTERVAL {
                return Ok(CleanupReport::skipped());
            }
        }
        let orphaned: Vec<SettingsId> = inner
            .settings
            .values()
            .filter(|s| !s.is_default)
            .filter(|s| !inner.jobs.values().any(|j| j.settings_id == Some(s.id)))
            .map(|s| s.id)
            .collect();
        let count = orphaned.len() as u64;
        for id in orphaned {
            inner.settings.remove(&id);
        }
        inner.cleanup_last_ran.insert("general", now);
        Ok(CleanupReport::ran(count))
    }

    async fn run_jobs_cleanup(&self, retention_days: Option<u32>) -> StorageResult<CleanupReport> {
        let Some(retention_days) = retention_days else {
            return Ok(CleanupReport::skipped());
        };
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if let Some(last) = inner.cleanup_last_ran.get("jobs") {
            if now - *last < MIN_CLEANUP_INTERVAL {
                return Ok(CleanupReport::skipped());
            }
        }
        let cutoff = now - Duration::days(retention_days as i64);
        let expired: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|j| j.finish_timestamp.is_some_and(|t| t < cutoff))
            .map(|j| j.id)
            .collect();
        let count = expired.len() as u64;
        for id in &expired {
            inner.jobs.remove(id);
            inner.transcripts.remove(id);
        }
        inner.cleanup_last_ran.insert("jobs", now);
        Ok(CleanupReport::ran(count))
    }

    async fn run_users_cleanup(
        &self,
        retention_days: Option<u32>,
    ) -> StorageResult<UsersCleanupOutcome> {
        let Some(retention_days) = retention_days else {
            return Ok(UsersCleanupOutcome::default());
        };
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if let Some(last) = inner.cleanup_last_ran.get("users") {
            if now - *last < MIN_CLEANUP_INTERVAL {
                return Ok(UsersCleanupOutcome::default());
            }
        }

        let retention_days = retention_days as i64;
        let mut warnings = Vec::new();
        for (user_id, user) in inner.users.iter() {
            if user.provisioned {
                continue;
            }
            let idle_days = (now - user.last_login).num_days();
            if idle_days == retention_days - 30 {
                warnings.push(UserRetentionWarning {
                    user_id: *user_id,
                    email: user.email.clone(),
                    kind: RetentionWarningKind::ThirtyDays,
                });
            } else if idle_days == retention_days - 7 {
                warnings.push(UserRetentionWarning {
                    user_id: *user_id,
                    email: user.email.clone(),
                    kind: RetentionWarningKind::SevenDays,
                });
            }
        }

        let cutoff = now - Duration::days(retention_days);
        let expired: Vec<UserId> = inner
            .users
            .iter()
            .filter(|(_, u)| !u.provisioned && u.last_login < cutoff)
            .map(|(id, _)| *id)
            .collect();
        let count = expired.len() as u64;
        for id in &expired {
            inner.users.remove(id);
        }
        inner.cleanup_last_ran.insert("users", now);
        Ok(UsersCleanupOutcome {
            report: CleanupReport::ran(count),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use transcriptord_core::{FakeClock, Segment};

    fn store() -> InMemoryDurableStore<FakeClock> {
        InMemoryDurableStore::with_clock(FakeClock::default(), 1024)
    }

    fn audio(bytes: &[u8]) -> AudioStream {
        let chunk: Result<Vec<u8>, StorageError> = Ok(bytes.to_vec());
        Box::pin(stream::iter(vec![chunk]))
    }

    #[tokio::test]
    async fn add_job_then_fetch_round_trips() {
        let store = store();
        let job_id = store
            .add_job(UserId::new(7), "audio.wav", None, audio(b"hello"))
            .await
            .unwrap();
        let job = store.get_job_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.user_id, UserId::new(7));
        assert!(job.audio_handle.is_some());
    }

    #[tokio::test]
    async fn unowned_settings_id_is_not_found() {
        let store = store();
        let other_user_settings = store
            .upsert_settings(JobSettings::builder().user_id(UserId::new(1)).build())
            .await
            .unwrap();
        let err = store
            .add_job(
                UserId::new(2),
                "audio.wav",
                Some(other_user_settings.id),
                audio(b"hi"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn finish_successful_then_get_transcript_marks_downloaded_once() {
        let store = store();
        let job_id = store
            .add_job(UserId::new(7), "audio.wav", None, audio(b"hello"))
            .await
            .unwrap();
        let snapshot = transcriptord_core::test_support::sample_runner_snapshot();
        let transcript = Transcript::new(
            job_id,
            vec![Segment {
                start_seconds: 0.0,
                end_seconds: 1.0,
                text: "hi".into(),
                speaker: None,
                confidence: None,
            }],
        );
        store
            .finish_successful(job_id, snapshot, transcript)
            .await
            .unwrap();

        let job = store.get_job_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.downloaded, Some(false));

        let rendered = store
            .get_transcript_and_mark_downloaded(UserId::new(7), job_id, TranscriptFormat::Text)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rendered.into_text().as_deref(), Some("hi"));

        let job = store.get_job_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.downloaded, Some(true));
    }

    #[tokio::test]
    async fn mark_aborting_is_idempotent() {
        let store = store();
        let job_id = store
            .add_job(UserId::new(7), "audio.wav", None, audio(b"hello"))
            .await
            .unwrap();
        store.mark_aborting(job_id).await.unwrap();
        store.mark_aborting(job_id).await.unwrap();
        let job = store.get_job_by_id(job_id).await.unwrap().unwrap();
        assert!(job.aborting);
        assert!(job.audio_handle.is_none());
    }

    #[tokio::test]
    async fn delete_jobs_refuses_unfinished() {
        let store = store();
        let job_id = store
            .add_job(UserId::new(7), "audio.wav", None, audio(b"hello"))
            .await
            .unwrap();
        let err = store
            .delete_jobs(UserId::new(7), &[job_id])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[tokio::test]
    async fn only_one_default_settings_row_survives_per_user() {
        let store = store();
        let user = UserId::new(7);
        let first = store
            .upsert_settings(JobSettings::builder().user_id(user).is_default(true).build())
            .await
            .unwrap();
        let second = store
            .upsert_settings(JobSettings::builder().user_id(user).is_default(true).build())
            .await
            .unwrap();
        let rows = store.list_settings(user).await.unwrap();
        let defaults: Vec<_> = rows.iter().filter(|s| s.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
        assert_ne!(first.id, second.id);
    }
}
