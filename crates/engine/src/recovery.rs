//! Startup recovery (SPEC §4.7), grounded on
//! `examples/original_source/project_W/runner_manager.py`'s
//! `load_jobs_from_db`.
//!
//! Runs once, synchronously, after both stores are open and before the HTTP
//! listener accepts connections, so no request can observe a job durable
//! storage knows about but the ephemeral queue doesn't yet (SPEC §4.7).

use std::sync::Arc;

use transcriptord_cache::EphemeralStore;
use transcriptord_storage::DurableStore;

use crate::dispatcher::Dispatcher;
use crate::error::EngineResult;

pub struct RecoveryReport {
    pub recovered: usize,
    pub aborted: usize,
}

/// For every durably unfinished job: if it was marked aborting, finalise it
/// as failed (the runner that would have reported completion is gone);
/// otherwise enqueue it at priority `-job_id` (older jobs float above newer
/// ones; SPEC §4.3 "Tie-breaks") and attempt immediate assignment.
pub async fn recover(
    durable: &Arc<dyn DurableStore>,
    ephemeral: &Arc<dyn EphemeralStore>,
    dispatcher: &Dispatcher,
) -> EngineResult<RecoveryReport> {
    let unfinished = durable.get_all_unfinished_jobs().await?;
    let mut report = RecoveryReport {
        recovered: 0,
        aborted: 0,
    };

    for job in unfinished {
        if job.aborting {
            durable
                .finish_failed(job.job_id, "Job was aborted", None)
                .await?;
            report.aborted += 1;
            continue;
        }

        let priority = -(job.job_id.get() as f64);
        ephemeral.enqueue_job(job.job_id, priority).await?;
        dispatcher.try_assign(job.job_id, job.user_id).await?;
        report.recovered += 1;
    }

    tracing::info!(
        recovered = report.recovered,
        aborted = report.aborted,
        "recovery complete"
    );
    Ok(report)
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
