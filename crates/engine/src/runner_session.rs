//! The runner session manager (SPEC §4.4), grounded on
//! `examples/original_source/project_W/routers/runners.py`'s
//! register/unregister/retrieve_job_info/retrieve_job_audio/
//! submit_job_result/heartbeat handlers for the exact status-code contract,
//! and on `caching.py`'s `RedisAdapter` for the ephemeral operations each
//! transition performs.

use std::sync::Arc;
use std::time::Duration;

use transcriptord_cache::EphemeralStore;
use transcriptord_core::{JobId, JobSettings, RunnerId, RunnerSnapshot, Transcript};
use transcriptord_storage::{AudioStream, DurableStore};

use crate::dispatcher::Dispatcher;
use crate::error::{EngineError, EngineResult};
use crate::mail::{MailMessage, MailSender};
use crate::token;

/// Declared at registration time; the runner's long-lived credential is
/// authenticated separately (it's what resolves `runner_id` in the first
/// place).
pub struct RunnerDeclaration {
    pub name: String,
    pub version: String,
    pub git_hash: String,
    pub source_url: String,
    pub priority: i64,
}

pub struct RegisteredSession {
    pub runner_id: RunnerId,
    pub session_token: String,
}

pub struct HeartbeatOutcome {
    pub abort: bool,
    pub job_assigned: bool,
}

/// The outcome a runner reports for its assigned job.
pub enum JobOutcome {
    Success { transcript: Transcript },
    Failure { error_msg: String },
}

pub struct RunnerSessionManager {
    durable: Arc<dyn DurableStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    dispatcher: Dispatcher,
    mailer: Arc<dyn MailSender>,
    heartbeat_timeout: Duration,
}

impl RunnerSessionManager {
    pub fn new(
        durable: Arc<dyn DurableStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        dispatcher: Dispatcher,
        mailer: Arc<dyn MailSender>,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            durable,
            ephemeral,
            dispatcher,
            mailer,
            heartbeat_timeout,
        }
    }

    /// Resolves a long-lived runner credential to its durable identity and
    /// ensures it isn't already online (SPEC §4.4 `register`, 409-shaped
    /// conflict otherwise).
    pub async fn register(
        &self,
        credential: &str,
        declaration: RunnerDeclaration,
    ) -> EngineResult<RegisteredSession> {
        let identity = self
            .durable
            .get_runner_by_token_hash(&token::hash_token(credential))
            .await?
            .ok_or(EngineError::Unauthorized)?;

        if self.ephemeral.get_online_runner(identity.id).await?.is_some() {
            return Err(EngineError::already_online("runner already online"));
        }

        let session_token = token::generate_token();
        let runner = transcriptord_core::OnlineRunner {
            id: identity.id,
            name: declaration.name,
            version: declaration.version,
            git_hash: declaration.git_hash,
            source_url: declaration.source_url,
            priority: declaration.priority,
            session_token_hash: token::hash_token(&session_token),
            assigned_job_id: None,
            in_process: false,
        };
        self.ephemeral
            .register_online_runner(runner, self.heartbeat_timeout)
            .await?;
        self.dispatcher.try_assign_any().await?;

        Ok(RegisteredSession {
            runner_id: identity.id,
            session_token,
        })
    }

    pub async fn unregister(&self, runner_id: RunnerId, session_token: &str) -> EngineResult<()> {
        self.authenticate(runner_id, session_token).await?;
        let freed = self.ephemeral.unregister_online_runner(runner_id).await?;
        if freed.is_some() {
            self.dispatcher.try_assign_any().await?;
        }
        Ok(())
    }

    pub async fn retrieve_job_info(
        &self,
        runner_id: RunnerId,
        session_token: &str,
    ) -> EngineResult<(JobId, JobSettings)> {
        let runner = self.authenticate(runner_id, session_token).await?;
        let job_id = runner
            .assigned_job_id
            .ok_or_else(|| EngineError::validation("no assignment"))?;
        let job = self
            .durable
            .get_job_by_id(job_id)
            .await?
            .ok_or_else(|| EngineError::inconsistent(format!("assigned job {job_id} has no durable row")))?;
        if job.aborting {
            return Err(EngineError::Aborting);
        }
        let settings = match job.settings_id {
            Some(settings_id) => self
                .durable
                .list_settings(job.user_id)
                .await?
                .into_iter()
                .find(|s| s.id == settings_id)
                .ok_or_else(|| EngineError::inconsistent(format!("settings {settings_id} missing")))?,
            None => self.durable.get_or_create_default_settings(job.user_id).await?,
        };
        Ok((job_id, settings))
    }

    pub async fn retrieve_job_audio(
        &self,
        runner_id: RunnerId,
        session_token: &str,
    ) -> EngineResult<AudioStream> {
        let (job_id, _settings) = self.retrieve_job_info(runner_id, session_token).await?;
        self.ephemeral.mark_runner_in_process(runner_id).await?;
        self.durable
            .get_job_audio(job_id)
            .await?
            .ok_or_else(|| EngineError::inconsistent(format!("job {job_id} has no audio blob")))
    }

    /// The job id currently assigned to this runner, without the
    /// aborting/settings checks `retrieve_job_info` performs — used by the
    /// HTTP layer to build a `Transcript` before calling `submit_result`,
    /// which must stay reachable even while the job is aborting (SPEC §8
    /// seed scenario 4).
    pub async fn assigned_job_id(&self, runner_id: RunnerId, session_token: &str) -> EngineResult<JobId> {
        let runner = self.authenticate(runner_id, session_token).await?;
        runner
            .assigned_job_id
            .ok_or_else(|| EngineError::validation("no assignment"))
    }

    pub async fn submit_result(
        &self,
        runner_id: RunnerId,
        session_token: &str,
        outcome: JobOutcome,
    ) -> EngineResult<()> {
        let runner = self.authenticate(runner_id, session_token).await?;
        if !runner.in_process {
            return Err(EngineError::validation("not in progress"));
        }
        let job_id = runner
            .assigned_job_id
            .ok_or_else(|| EngineError::validation("not in progress"))?;
        let in_process = self
            .ephemeral
            .get_in_process_job(job_id)
            .await?
            .ok_or_else(|| EngineError::validation("not in progress"))?;

        let snapshot = RunnerSnapshot {
            runner_id: Some(runner_id),
            runner_name: runner.name.clone(),
            runner_version: runner.version.clone(),
            runner_git_hash: runner.git_hash.clone(),
            runner_source_url: runner.source_url.clone(),
        };
        let finished_at = match &outcome {
            JobOutcome::Success { transcript } => {
                self.durable
                    .finish_successful(job_id, snapshot, transcript.clone())
                    .await?;
                None
            }
            JobOutcome::Failure { error_msg } => {
                self.durable
                    .finish_failed(job_id, error_msg, Some(snapshot))
                    .await?;
                Some(error_msg.clone())
            }
        };

        self.ephemeral.finalize_job(&runner, job_id).await?;

        if let Some(error_msg) = finished_at {
            self.notify_finished(in_process.user_id, job_id, Some(&error_msg));
        } else {
            self.notify_finished(in_process.user_id, job_id, None);
        }

        self.dispatcher.try_assign_any().await?;
        Ok(())
    }

    pub async fn heartbeat(
        &self,
        runner_id: RunnerId,
        session_token: &str,
        progress: f64,
    ) -> EngineResult<HeartbeatOutcome> {
        let runner = self.authenticate(runner_id, session_token).await?;
        self.ephemeral
            .reset_runner_expiration(runner_id, self.heartbeat_timeout)
            .await?;

        let Some(job_id) = runner.assigned_job_id else {
            return Ok(HeartbeatOutcome {
                abort: false,
                job_assigned: false,
            });
        };

        self.ephemeral.report_progress_if_changed(job_id, progress).await?;
        let abort = self
            .ephemeral
            .get_in_process_job(job_id)
            .await?
            .map(|j| j.abort)
            .unwrap_or(false);

        // An aborting assignment is reported as no assignment at all (SPEC
        // §4.4 heartbeat contract, §8 seed scenario 4): the runner is told
        // to stop, not merely flagged.
        Ok(HeartbeatOutcome {
            abort,
            job_assigned: !abort,
        })
    }

    async fn authenticate(
        &self,
        runner_id: RunnerId,
        session_token: &str,
    ) -> EngineResult<transcriptord_core::OnlineRunner> {
        let runner = self
            .ephemeral
            .get_online_runner(runner_id)
            .await?
            .ok_or(EngineError::Unauthorized)?;
        if runner.session_token_hash != token::hash_token(session_token) {
            return Err(EngineError::SessionMismatch);
        }
        Ok(runner)
    }

    /// Fire-and-forget background notification, enqueued only after the
    /// durable finalisation has committed (SPEC §9 outbox pattern).
    fn notify_finished(&self, user_id: transcriptord_core::UserId, job_id: JobId, error_msg: Option<&str>) {
        let mailer = Arc::clone(&self.mailer);
        let body = match error_msg {
            Some(err) => format!("Job {job_id} failed: {err}"),
            None => format!("Job {job_id} finished"),
        };
        tokio::spawn(async move {
            mailer
                .send(MailMessage {
                    to: format!("user:{}", user_id.get()),
                    subject: format!("Transcription job {job_id}"),
                    body,
                })
                .await;
        });
    }
}

#[cfg(test)]
#[path = "runner_session_tests.rs"]
mod tests;
