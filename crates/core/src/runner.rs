//! Runner identity and the two ephemeral records that track a live runner
//! and the job it might be holding (SPEC §3, §4.4).

use crate::error::{CoreError, CoreResult};
use crate::ids::{JobId, RunnerId, UserId};
use serde::{Deserialize, Serialize};

/// The durable credential row for an accredited runner. Declared metadata
/// (name, version, ...) is supplied fresh at each registration and lives
/// only on the [`OnlineRunner`] record, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerIdentity {
    pub id: RunnerId,
    /// `base64url(sha256(token))`, unpadded (SPEC §6 "Runner-token bytes").
    pub token_hash: String,
}

/// Liveness + assignment record for a runner currently known to the
/// ephemeral store. TTL lives alongside this record in the store, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineRunner {
    pub id: RunnerId,
    pub name: String,
    pub version: String,
    pub git_hash: String,
    pub source_url: String,
    pub priority: i64,
    /// `base64url(sha256(session_token))`, rotated fresh per registration.
    pub session_token_hash: String,
    pub assigned_job_id: Option<JobId>,
    pub in_process: bool,
}

impl OnlineRunner {
    pub fn is_idle(&self) -> bool {
        self.assigned_job_id.is_none()
    }
}

/// Ephemeral record created the instant a job is assigned to a runner, and
/// deleted the instant the job is finalised or the runner expires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InProcessJob {
    pub runner_id: RunnerId,
    pub user_id: UserId,
    pub progress: f64,
    pub abort: bool,
}

impl InProcessJob {
    pub fn new(runner_id: RunnerId, user_id: UserId) -> Self {
        Self {
            runner_id,
            user_id,
            progress: 0.0,
            abort: false,
        }
    }

    /// Sets progress after validating it falls in `0.0..=100.0` (SPEC §3).
    pub fn set_progress(&mut self, progress: f64) -> CoreResult<()> {
        if !(0.0..=100.0).contains(&progress) {
            return Err(CoreError::validation(format!(
                "progress must be within 0.0..=100.0, got {progress}"
            )));
        }
        self.progress = progress;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_runner_has_no_assignment() {
        let runner = OnlineRunner {
            id: RunnerId::new(1),
            name: "gpu".into(),
            version: "1".into(),
            git_hash: "abc".into(),
            source_url: "https://example.invalid".into(),
            priority: 0,
            session_token_hash: "hash".into(),
            assigned_job_id: None,
            in_process: false,
        };
        assert!(runner.is_idle());
    }

    #[test]
    fn progress_out_of_range_is_rejected() {
        let mut job = InProcessJob::new(RunnerId::new(1), UserId::new(7));
        assert!(job.set_progress(-1.0).is_err());
        assert!(job.set_progress(100.1).is_err());
        assert!(job.set_progress(33.5).is_ok());
        assert_eq!(job.progress, 33.5);
    }
}
