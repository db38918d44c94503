//! Shared test harness: wires the in-memory doubles of both stores behind
//! the same `Arc<dyn Trait>` handles production code uses, so engine tests
//! exercise the real `Dispatcher`/`RunnerSessionManager`/`JobLifecycleManager`
//! code paths end to end (SPEC §8 seed scenarios).

use std::sync::Arc;
use std::time::Duration;

use transcriptord_cache::{EphemeralStore, InMemoryEphemeralStore};
use transcriptord_core::{FakeClock, RunnerIdentity, SystemClock, UserId};
use transcriptord_storage::{DurableStore, InMemoryDurableStore};

use crate::dispatcher::Dispatcher;
use crate::job_lifecycle::JobLifecycleManager;
use crate::mail::RecordingMailSender;
use crate::runner_session::RunnerSessionManager;
use crate::token;

pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Harness {
    /// Typed handle for tests that need double-specific helpers like
    /// `seed_job`; `durable` below is the same store behind the trait
    /// object production code takes.
    pub durable_memory: Arc<InMemoryDurableStore<SystemClock>>,
    pub durable: Arc<dyn DurableStore>,
    pub ephemeral: Arc<dyn EphemeralStore>,
    pub clock: FakeClock,
    pub dispatcher: Dispatcher,
    pub sessions: RunnerSessionManager,
    pub jobs: JobLifecycleManager,
    pub mailer: Arc<RecordingMailSender>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = FakeClock::default();
        let durable_memory = Arc::new(InMemoryDurableStore::new(10 * 1024 * 1024));
        let durable: Arc<dyn DurableStore> = durable_memory.clone();
        let ephemeral: Arc<dyn EphemeralStore> =
            Arc::new(InMemoryEphemeralStore::with_clock(clock.clone()));
        let dispatcher = Dispatcher::new(durable.clone(), ephemeral.clone(), HEARTBEAT_TIMEOUT);
        let mailer = Arc::new(RecordingMailSender::new());
        let sessions = RunnerSessionManager::new(
            durable.clone(),
            ephemeral.clone(),
            dispatcher.clone(),
            mailer.clone(),
            HEARTBEAT_TIMEOUT,
        );
        let jobs = JobLifecycleManager::new(durable.clone(), ephemeral.clone(), dispatcher.clone());
        Self {
            durable_memory,
            durable,
            ephemeral,
            clock,
            dispatcher,
            sessions,
            jobs,
            mailer,
        }
    }

    /// Creates a durable runner identity and returns its raw credential
    /// alongside the assigned `RunnerId`.
    pub async fn create_runner_credential(&self) -> (String, RunnerIdentity) {
        let raw = token::generate_token();
        let identity = self
            .durable
            .create_runner_identity(&token::hash_token(&raw))
            .await
            .expect("create runner identity");
        (raw, identity)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn user(id: i64) -> UserId {
    UserId::new(id)
}

pub fn audio_stream(bytes: Vec<u8>) -> transcriptord_storage::AudioStream {
    use futures_util::stream;
    Box::pin(stream::once(async move { Ok(bytes) }))
}
