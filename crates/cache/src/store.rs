//! The ephemeral-store contract (SPEC §4.2).
//!
//! Every method here either is a single atomic grouping on its own, or is
//! explicitly documented as composing two such groupings (e.g.
//! `unregister_online_runner`, which deletes the runner then, if it held a
//! job, frees that job too) — never spanning a grouping across two
//! `.await` points the caller controls, per SPEC §5 "Ordering guarantees".

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use transcriptord_core::{DomainEvent, InProcessJob, JobId, OnlineRunner, RunnerId, UserId};

use crate::error::CacheResult;

/// A live subscription to a user's event channel (SPEC §4.6). Dropping it
/// unsubscribes.
pub type EventStream = BoxStream<'static, DomainEvent>;

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Grouping 1 (SPEC §4.2): write the runner record, set its TTL, and
    /// insert it into the runner priority set — all at once, so a reader
    /// never observes a runner record without priority-set membership or
    /// vice versa.
    async fn register_online_runner(&self, runner: OnlineRunner, ttl: Duration)
        -> CacheResult<()>;

    async fn get_online_runner(&self, runner_id: RunnerId) -> CacheResult<Option<OnlineRunner>>;

    /// Refreshes the runner's TTL and, if it holds an assigned job, that
    /// job's TTL too, in the same call — so a just-assigned job can never
    /// expire between assignment and the runner's next heartbeat (SPEC §5).
    async fn reset_runner_expiration(&self, runner_id: RunnerId, ttl: Duration)
        -> CacheResult<()>;

    async fn mark_runner_in_process(&self, runner_id: RunnerId) -> CacheResult<()>;

    /// Grouping 4 (SPEC §4.2): deletes the runner record and its
    /// priority-set membership; if it was holding an assigned job, also
    /// deletes that job's in-process record and publishes the update.
    /// Returns the freed job (and its owner) so the caller can re-enqueue
    /// and trigger reassignment — re-enqueuing itself is the caller's job,
    /// not this store's, since it touches the job queue's priority policy.
    async fn unregister_online_runner(
        &self,
        runner_id: RunnerId,
    ) -> CacheResult<Option<(JobId, UserId)>>;

    async fn enqueue_job(&self, job_id: JobId, priority: f64) -> CacheResult<()>;

    async fn remove_job_from_queue(&self, job_id: JobId) -> CacheResult<()>;

    async fn queue_contains_job(&self, job_id: JobId) -> CacheResult<bool>;

    async fn queue_len(&self) -> CacheResult<u64>;

    /// Walks the job queue highest-priority-first and returns the first
    /// member with no in-process record (SPEC §4.3 `try_assign_any`).
    /// Members whose in-process record exists (already being worked) are
    /// skipped without being removed from the queue — the queue entry is
    /// only cleared at finalisation (SPEC §4.2 grouping 3).
    async fn peek_highest_priority_unassigned_job(&self) -> CacheResult<Option<JobId>>;

    /// Grouping 2 (SPEC §4.2): repeatedly pops the top of the runner
    /// priority set until a usable runner is found (or the set is
    /// exhausted), then atomically assigns `job_id` to it, creates the
    /// in-process-job record, publishes to the user's channel, and resets
    /// both TTLs. Returns the assigned runner id, or `None` if no usable
    /// runner existed.
    ///
    /// Popped-but-unusable runners (stale TTL, or already assigned — a
    /// race) are discarded rather than re-inserted, matching the
    /// reference's lossy retry loop (SPEC §9 open question, DESIGN.md).
    async fn assign_job_to_runner(
        &self,
        job_id: JobId,
        user_id: UserId,
        ttl: Duration,
    ) -> CacheResult<Option<RunnerId>>;

    async fn get_in_process_job(&self, job_id: JobId) -> CacheResult<Option<InProcessJob>>;

    /// Grouping 3 (SPEC §4.2): deletes the in-process-job record, clears
    /// `in_process`/`assigned_job_id` on the runner record, removes the job
    /// from the queue if still present, re-inserts the runner into the
    /// priority set, and publishes to the user's channel.
    async fn finalize_job(&self, runner: &OnlineRunner, job_id: JobId) -> CacheResult<()>;

    async fn abort_in_process_job(&self, job_id: JobId) -> CacheResult<()>;

    /// Sets progress and publishes only if it actually changed from the
    /// stored value (SPEC §8 "a heartbeat arriving with progress identical
    /// to the stored value must not publish an event"). Returns whether it
    /// changed.
    async fn report_progress_if_changed(
        &self,
        job_id: JobId,
        progress: f64,
    ) -> CacheResult<bool>;

    /// Subscribes to a user's event channel (SPEC §4.6). Delivery order per
    /// user is preserved; no replay, no cross-user ordering.
    async fn subscribe(&self, user_id: UserId) -> CacheResult<EventStream>;

    async fn publish(&self, event: DomainEvent) -> CacheResult<()>;
}
