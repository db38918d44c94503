//! The dispatcher (SPEC §4.3), grounded on
//! `examples/original_source/project_W/caching.py`'s
//! `assign_job_to_runner_if_possible`/`assign_queue_job_to_runner_if_possible`
//! and `alfredjeanlab-oddjobs`'s `dispatch.rs` shape (a stateless struct
//! holding only references to the stores it coordinates).
//!
//! Stateless with respect to its own memory: every fact it reasons about
//! lives in the ephemeral or durable store (SPEC §5 "Shared resource
//! policy").

use std::sync::Arc;
use std::time::Duration;

use transcriptord_cache::EphemeralStore;
use transcriptord_core::{JobId, UserId};
use transcriptord_storage::DurableStore;

use crate::error::EngineResult;

/// Coordinates job-to-runner assignment. Holds no state of its own; both
/// stores are shared, reference-counted handles (SPEC §9 "application
/// context").
#[derive(Clone)]
pub struct Dispatcher {
    durable: Arc<dyn DurableStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    heartbeat_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        durable: Arc<dyn DurableStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            durable,
            ephemeral,
            heartbeat_timeout,
        }
    }

    /// Attempts to pair `job_id` with a free runner now. A no-op (not an
    /// error) if no usable runner exists; the job stays queued for the next
    /// trigger (SPEC §4.3, §7 "the dispatcher does not throw").
    #[tracing::instrument(skip(self), fields(job_id = job_id.get(), user_id = user_id.get()))]
    pub async fn try_assign(&self, job_id: JobId, user_id: UserId) -> EngineResult<bool> {
        let assigned = self
            .ephemeral
            .assign_job_to_runner(job_id, user_id, self.heartbeat_timeout)
            .await?;
        match assigned {
            Some(runner_id) => {
                tracing::debug!(runner_id = runner_id.get(), "assigned job to runner");
                Ok(true)
            }
            None => {
                tracing::debug!("no usable runner available, job remains queued");
                Ok(false)
            }
        }
    }

    /// Walks the job queue highest-to-lowest priority and assigns the first
    /// member that has no in-process record yet (SPEC §4.3).
    #[tracing::instrument(skip(self))]
    pub async fn try_assign_any(&self) -> EngineResult<()> {
        loop {
            let Some(job_id) = self.ephemeral.peek_highest_priority_unassigned_job().await? else {
                return Ok(());
            };
            let Some(job) = self.durable.get_job_by_id(job_id).await? else {
                // Durable and ephemeral disagree: the queue references a job
                // the durable store no longer has. Drop it and keep walking.
                tracing::error!(job_id = job_id.get(), "queued job has no durable row");
                self.ephemeral.remove_job_from_queue(job_id).await?;
                continue;
            };
            if !self.try_assign(job_id, job.user_id).await? {
                // assign_job_to_runner exhausted the runner set entirely; no
                // other queue member would fare better right now.
                return Ok(());
            }
            // Keep walking: more than one runner may be idle.
        }
    }
}
