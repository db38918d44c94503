//! In-memory [`EphemeralStore`] test double.
//!
//! Mirrors Redis TTL semantics (SPEC §3) by stamping an expiry instant per
//! record and checking it lazily on read, rather than running a background
//! sweep — so a test can drive expiry deterministically with a [`FakeClock`]
//! instead of sleeping `heartbeat_timeout_seconds`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use transcriptord_core::{
    Clock, DomainEvent, InProcessJob, JobId, OnlineRunner, RunnerId, SystemClock, UserId,
};

use crate::error::CacheResult;
use crate::store::{EphemeralStore, EventStream};

const CHANNEL_CAPACITY: usize = 256;

struct Expiring<T> {
    value: T,
    deadline: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    runners: HashMap<RunnerId, Expiring<OnlineRunner>>,
    /// Membership in the runner priority set: present iff the runner is
    /// idle (SPEC §3 "Online runner").
    runner_priority: HashMap<RunnerId, f64>,
    jobs: HashMap<JobId, Expiring<InProcessJob>>,
    queue: HashMap<JobId, f64>,
    channels: HashMap<UserId, broadcast::Sender<DomainEvent>>,
}

/// In-memory double for [`EphemeralStore`], parameterised by a [`Clock`] so
/// TTL expiry can be driven deterministically in tests.
pub struct InMemoryEphemeralStore<C: Clock = SystemClock> {
    clock: C,
    inner: Mutex<Inner>,
}

impl InMemoryEphemeralStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryEphemeralStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryEphemeralStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn channel(inner: &mut Inner, user_id: UserId) -> broadcast::Sender<DomainEvent> {
        inner
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn publish_locked(inner: &mut Inner, event: DomainEvent) {
        // No subscribers is not an error: delivery is best-effort (SPEC §4.6).
        let _ = Self::channel(inner, event.user_id).send(event);
    }

    /// Drops the runner record if its TTL has elapsed, returning whether it
    /// was (still) live. Called at the top of every read so expiry doesn't
    /// need a background task (SPEC §5 "Runner absence is detected solely
    /// via TTL expiry").
    fn reap_runner(&self, inner: &mut Inner, runner_id: RunnerId) -> bool {
        let now = self.clock.now();
        let live = inner
            .runners
            .get(&runner_id)
            .is_some_and(|r| r.deadline > now);
        if !live {
            inner.runners.remove(&runner_id);
            inner.runner_priority.remove(&runner_id);
        }
        live
    }

    fn reap_job(&self, inner: &mut Inner, job_id: JobId) -> bool {
        let now = self.clock.now();
        let live = inner.jobs.get(&job_id).is_some_and(|j| j.deadline > now);
        if !live {
            inner.jobs.remove(&job_id);
        }
        live
    }
}

#[async_trait]
impl<C: Clock> EphemeralStore for InMemoryEphemeralStore<C> {
    async fn register_online_runner(
        &self,
        runner: OnlineRunner,
        ttl: Duration,
    ) -> CacheResult<()> {
        let deadline = self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let mut inner = self.inner.lock();
        let priority = runner.priority as f64;
        let runner_id = runner.id;
        inner.runners.insert(
            runner_id,
            Expiring {
                value: runner,
                deadline,
            },
        );
        inner.runner_priority.insert(runner_id, priority);
        Ok(())
    }

    async fn get_online_runner(&self, runner_id: RunnerId) -> CacheResult<Option<OnlineRunner>> {
        let mut inner = self.inner.lock();
        if !self.reap_runner(&mut inner, runner_id) {
            return Ok(None);
        }
        Ok(inner.runners.get(&runner_id).map(|r| r.value.clone()))
    }

    async fn reset_runner_expiration(
        &self,
        runner_id: RunnerId,
        ttl: Duration,
    ) -> CacheResult<()> {
        let deadline = self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let mut inner = self.inner.lock();
        if !self.reap_runner(&mut inner, runner_id) {
            return Ok(());
        }
        let assigned_job_id = inner.runners.get(&runner_id).and_then(|r| r.value.assigned_job_id);
        if let Some(entry) = inner.runners.get_mut(&runner_id) {
            entry.deadline = deadline;
        }
        if let Some(job_id) = assigned_job_id {
            if let Some(job) = inner.jobs.get_mut(&job_id) {
                job.deadline = deadline;
            }
        }
        Ok(())
    }

    async fn mark_runner_in_process(&self, runner_id: RunnerId) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        if !self.reap_runner(&mut inner, runner_id) {
            return Ok(());
        }
        if let Some(entry) = inner.runners.get_mut(&runner_id) {
            entry.value.in_process = true;
        }
        Ok(())
    }

    async fn unregister_online_runner(
        &self,
        runner_id: RunnerId,
    ) -> CacheResult<Option<(JobId, UserId)>> {
        let mut inner = self.inner.lock();
        let assigned = inner
            .runners
            .get(&runner_id)
            .and_then(|r| r.value.assigned_job_id);
        inner.runners.remove(&runner_id);
        inner.runner_priority.remove(&runner_id);

        let Some(job_id) = assigned else {
            return Ok(None);
        };
        let user_id = inner.jobs.get(&job_id).map(|j| j.value.user_id);
        inner.jobs.remove(&job_id);
        if let Some(user_id) = user_id {
            Self::publish_locked(
                &mut inner,
                DomainEvent::new(
                    user_id,
                    job_id,
                    transcriptord_core::EventKind::JobUpdated,
                ),
            );
            Ok(Some((job_id, user_id)))
        } else {
            Err(crate::error::CacheError::inconsistent(format!(
                "in_process_job:{job_id} had no user_id while its runner {runner_id} unregistered"
            )))
        }
    }

    async fn enqueue_job(&self, job_id: JobId, priority: f64) -> CacheResult<()> {
        self.inner.lock().queue.insert(job_id, priority);
        Ok(())
    }

    async fn remove_job_from_queue(&self, job_id: JobId) -> CacheResult<()> {
        self.inner.lock().queue.remove(&job_id);
        Ok(())
    }

    async fn queue_contains_job(&self, job_id: JobId) -> CacheResult<bool> {
        Ok(self.inner.lock().queue.contains_key(&job_id))
    }

    async fn queue_len(&self) -> CacheResult<u64> {
        Ok(self.inner.lock().queue.len() as u64)
    }

    async fn peek_highest_priority_unassigned_job(&self) -> CacheResult<Option<JobId>> {
        let mut inner = self.inner.lock();
        let mut ranked: Vec<(JobId, f64)> =
            inner.queue.iter().map(|(id, score)| (*id, *score)).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (job_id, _) in ranked {
            if !self.reap_job(&mut inner, job_id) && !inner.jobs.contains_key(&job_id) {
                return Ok(Some(job_id));
            }
        }
        Ok(None)
    }

    async fn assign_job_to_runner(
        &self,
        job_id: JobId,
        user_id: UserId,
        ttl: Duration,
    ) -> CacheResult<Option<RunnerId>> {
        let deadline = self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let mut inner = self.inner.lock();

        let runner_id = loop {
            let top = inner
                .runner_priority
                .iter()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(id, _)| *id);
            let Some(candidate) = top else {
                return Ok(None);
            };
            // Pop unconditionally: a popped-but-unusable runner is not
            // re-inserted, matching the reference's lossy retry (SPEC §9).
            inner.runner_priority.remove(&candidate);
            let usable = inner
                .runners
                .get(&candidate)
                .is_some_and(|r| r.deadline > self.clock.now() && r.value.assigned_job_id.is_none());
            if usable {
                break candidate;
            }
        };

        if let Some(entry) = inner.runners.get_mut(&runner_id) {
            entry.value.assigned_job_id = Some(job_id);
            entry.deadline = deadline;
        }
        inner.jobs.insert(
            job_id,
            Expiring {
                value: InProcessJob::new(runner_id, user_id),
                deadline,
            },
        );
        Self::publish_locked(
            &mut inner,
            DomainEvent::new(user_id, job_id, transcriptord_core::EventKind::JobUpdated),
        );
        Ok(Some(runner_id))
    }

    async fn get_in_process_job(&self, job_id: JobId) -> CacheResult<Option<InProcessJob>> {
        let mut inner = self.inner.lock();
        if !self.reap_job(&mut inner, job_id) {
            return Ok(None);
        }
        Ok(inner.jobs.get(&job_id).map(|j| j.value))
    }

    async fn finalize_job(&self, runner: &OnlineRunner, job_id: JobId) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        let user_id = inner.jobs.get(&job_id).map(|j| j.value.user_id);
        inner.jobs.remove(&job_id);
        if let Some(entry) = inner.runners.get_mut(&runner.id) {
            entry.value.assigned_job_id = None;
            entry.value.in_process = false;
        }
        inner.queue.remove(&job_id);
        inner
            .runner_priority
            .insert(runner.id, runner.priority as f64);
        if let Some(user_id) = user_id {
            Self::publish_locked(
                &mut inner,
                DomainEvent::new(user_id, job_id, transcriptord_core::EventKind::JobUpdated),
            );
        }
        Ok(())
    }

    async fn abort_in_process_job(&self, job_id: JobId) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        let user_id = inner.jobs.get(&job_id).map(|j| j.value.user_id);
        if let Some(entry) = inner.jobs.get_mut(&job_id) {
            entry.value.abort = true;
        }
        if let Some(user_id) = user_id {
            Self::publish_locked(
                &mut inner,
                DomainEvent::new(user_id, job_id, transcriptord_core::EventKind::JobUpdated),
            );
        }
        Ok(())
    }

    async fn report_progress_if_changed(
        &self,
        job_id: JobId,
        progress: f64,
    ) -> CacheResult<bool> {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if entry.value.progress == progress {
            return Ok(false);
        }
        entry
            .value
            .set_progress(progress)
            .map_err(|e| crate::error::CacheError::inconsistent(e.to_string()))?;
        let user_id = entry.value.user_id;
        Self::publish_locked(
            &mut inner,
            DomainEvent::new(user_id, job_id, transcriptord_core::EventKind::JobUpdated),
        );
        Ok(true)
    }

    async fn subscribe(&self, user_id: UserId) -> CacheResult<EventStream> {
        let mut inner = self.inner.lock();
        let sender = Self::channel(&mut inner, user_id);
        let receiver = sender.subscribe();
        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream) as BoxStream<'static, DomainEvent>)
    }

    async fn publish(&self, event: DomainEvent) -> CacheResult<()> {
        Self::publish_locked(&mut self.inner.lock(), event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcriptord_core::FakeClock;

    fn runner(id: i64, priority: i64) -> OnlineRunner {
        OnlineRunner {
            id: RunnerId::new(id),
            name: "gpu".into(),
            version: "1".into(),
            git_hash: "abc".into(),
            source_url: "https://example.invalid".into(),
            priority,
            session_token_hash: "hash".into(),
            assigned_job_id: None,
            in_process: false,
        }
    }

    #[tokio::test]
    async fn assigns_highest_priority_runner_first() {
        let store = InMemoryEphemeralStore::new();
        store
            .register_online_runner(runner(1, 10), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .register_online_runner(runner(2, 100), Duration::from_secs(60))
            .await
            .unwrap();

        let assigned = store
            .assign_job_to_runner(JobId::new(42), UserId::new(7), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(assigned, Some(RunnerId::new(2)));
    }

    #[tokio::test]
    async fn register_then_unregister_leaves_no_trace() {
        let store = InMemoryEphemeralStore::new();
        store
            .register_online_runner(runner(3, 50), Duration::from_secs(60))
            .await
            .unwrap();
        store.unregister_online_runner(RunnerId::new(3)).await.unwrap();
        assert!(store
            .get_online_runner(RunnerId::new(3))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn runner_expires_after_ttl_elapses() {
        let clock = FakeClock::default();
        let store = InMemoryEphemeralStore::with_clock(clock.clone());
        store
            .register_online_runner(runner(3, 50), Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(61));
        assert!(store
            .get_online_runner(RunnerId::new(3))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn identical_progress_does_not_publish() {
        let store = InMemoryEphemeralStore::new();
        store
            .register_online_runner(runner(3, 50), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .assign_job_to_runner(JobId::new(42), UserId::new(7), Duration::from_secs(60))
            .await
            .unwrap();
        // progress starts at 0.0; reporting 0.0 again must not count as a change.
        let changed = store
            .report_progress_if_changed(JobId::new(42), 0.0)
            .await
            .unwrap();
        assert!(!changed);
        let changed = store
            .report_progress_if_changed(JobId::new(42), 33.5)
            .await
            .unwrap();
        assert!(changed);
    }
}
