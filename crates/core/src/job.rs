//! Job entity and its state machine.

use crate::error::{CoreError, CoreResult};
use crate::ids::{JobId, RunnerId, SettingsId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle to the audio blob stored as a Postgres large object.
/// Never interpreted outside the durable store adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioHandle(pub i64);

impl std::fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runner metadata frozen onto a job once a runner has been assigned to it.
///
/// `runner_id` may go null on its own if the runner's durable identity is
/// later deleted; the rest of the fields are all-or-nothing (SPEC §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSnapshot {
    pub runner_id: Option<RunnerId>,
    pub runner_name: String,
    pub runner_version: String,
    pub runner_git_hash: String,
    pub runner_source_url: String,
}

/// Status derived from a job's durable fields. Not stored directly — the
/// durable row stores the fields this is computed from (`finish_timestamp`,
/// `aborting`, `downloaded`, `error_msg`), matching the reference schema,
/// which has no literal status column either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Unfinished,
    Aborting,
    Succeeded,
    Failed,
}

crate::simple_display! {
    JobStatus {
        Unfinished => "unfinished",
        Aborting => "aborting",
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

/// A job's durable record (SPEC §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub settings_id: Option<SettingsId>,
    pub created_at: DateTime<Utc>,
    pub file_name: String,
    pub aborting: bool,
    pub audio_handle: Option<AudioHandle>,
    pub finish_timestamp: Option<DateTime<Utc>>,
    pub runner: Option<RunnerSnapshot>,
    pub downloaded: Option<bool>,
    pub error_msg: Option<String>,
}

impl Job {
    /// Construct a freshly-submitted, unfinished job with its audio handle set.
    pub fn new_queued(
        id: JobId,
        user_id: UserId,
        settings_id: Option<SettingsId>,
        file_name: impl Into<String>,
        audio_handle: AudioHandle,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            settings_id,
            created_at,
            file_name: file_name.into(),
            aborting: false,
            audio_handle: Some(audio_handle),
            finish_timestamp: None,
            runner: None,
            downloaded: None,
            error_msg: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finish_timestamp.is_some()
    }

    pub fn status(&self) -> JobStatus {
        if self.finish_timestamp.is_none() {
            if self.aborting {
                JobStatus::Aborting
            } else {
                JobStatus::Unfinished
            }
        } else if self.error_msg.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Succeeded
        }
    }

    /// Mark the job as aborting: clears the audio handle (the blob is
    /// unlinked by the store), leaves everything else untouched. A no-op
    /// if already finished or already aborting (SPEC §8: idempotent).
    pub fn mark_aborting(&mut self) {
        if self.is_finished() || self.aborting {
            return;
        }
        self.aborting = true;
        self.audio_handle = None;
    }

    /// Transition to succeeded. Fails if already finished (SPEC §4.1).
    pub fn finish_succeeded(
        &mut self,
        runner: RunnerSnapshot,
        finished_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.is_finished() {
            return Err(CoreError::validation("job is already finished"));
        }
        self.finish_timestamp = Some(finished_at);
        self.aborting = false;
        self.downloaded = Some(false);
        self.error_msg = None;
        self.runner = Some(runner);
        self.audio_handle = None;
        Ok(())
    }

    /// Transition to failed. Fails if already finished (SPEC §4.1).
    pub fn finish_failed(
        &mut self,
        error_msg: impl Into<String>,
        runner: Option<RunnerSnapshot>,
        finished_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.is_finished() {
            return Err(CoreError::validation("job is already finished"));
        }
        self.finish_timestamp = Some(finished_at);
        self.aborting = false;
        self.downloaded = None;
        self.error_msg = Some(error_msg.into());
        self.runner = runner;
        self.audio_handle = None;
        Ok(())
    }

    /// Check the invariants a CHECK constraint would enforce in the durable
    /// store (SPEC §3, §8.1-2). Used by the in-memory store double and by
    /// tests; the real adapter leans on Postgres to enforce these instead.
    pub fn check_invariants(&self) -> CoreResult<()> {
        match self.status() {
            JobStatus::Succeeded => {
                if self.downloaded.is_none() || self.error_msg.is_some() {
                    return Err(CoreError::inconsistent(
                        "succeeded job must have downloaded set and no error_msg",
                    ));
                }
            }
            JobStatus::Failed => {
                if self.error_msg.is_none() {
                    return Err(CoreError::inconsistent(
                        "failed job must carry an error_msg",
                    ));
                }
            }
            JobStatus::Unfinished | JobStatus::Aborting => {}
        }
        if self.is_finished() && self.audio_handle.is_some() {
            return Err(CoreError::inconsistent(
                "finished job must not retain an audio handle",
            ));
        }
        if self.aborting && self.audio_handle.is_some() {
            return Err(CoreError::inconsistent(
                "aborting job must not retain an audio handle",
            ));
        }
        if self.aborting && self.is_finished() {
            return Err(CoreError::inconsistent(
                "aborting job must not be finished",
            ));
        }
        if let Some(runner) = &self.runner {
            if runner.runner_name.is_empty() && runner.runner_id.is_some() {
                return Err(CoreError::inconsistent(
                    "runner snapshot fields must be all-or-nothing aside from runner_id",
                ));
            }
        }
        Ok(())
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            file_name: String = "audio.wav",
        }
        set {
            id: JobId = JobId::new(1),
            user_id: UserId = UserId::new(1),
            settings_id: Option<SettingsId> = None,
            created_at: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_else(Utc::now),
            aborting: bool = false,
            audio_handle: Option<AudioHandle> = Some(AudioHandle(1)),
            finish_timestamp: Option<DateTime<Utc>> = None,
            runner: Option<RunnerSnapshot> = None,
            downloaded: Option<bool> = None,
            error_msg: Option<String> = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
