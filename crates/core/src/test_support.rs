//! Shared fixtures for tests across the workspace.

use crate::ids::{JobId, RunnerId, UserId};
use crate::job::RunnerSnapshot;

pub fn sample_runner_snapshot() -> RunnerSnapshot {
    RunnerSnapshot {
        runner_id: Some(RunnerId::new(3)),
        runner_name: "gpu-box".into(),
        runner_version: "1.0.0".into(),
        runner_git_hash: "abc123".into(),
        runner_source_url: "https://example.invalid/runner".into(),
    }
}

pub const SAMPLE_USER_ID: UserId = UserId::new(7);
pub const SAMPLE_JOB_ID: JobId = JobId::new(42);
pub const SAMPLE_RUNNER_ID: RunnerId = RunnerId::new(3);
