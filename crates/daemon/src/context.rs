//! The application context (SPEC §2, §9 "Global mutable state"): owns the
//! store/cache/mail handles and configuration, threaded explicitly through
//! handlers and background tasks instead of living in process-wide globals.
//! `open()`/`close()` are both idempotent.

use std::sync::Arc;

use parking_lot::Mutex;

use transcriptord_cache::{EphemeralStore, RedisEphemeralStore};
use transcriptord_core::{AuthProvider, InMemoryAuthProvider};
use transcriptord_engine::{Dispatcher, JobLifecycleManager, LoggingMailSender, MailSender, RunnerSessionManager};
use transcriptord_storage::{DurableStore, PgDurableStore};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to open durable store: {0}")]
    Storage(#[from] transcriptord_storage::StorageError),
    #[error("failed to open ephemeral store: {0}")]
    Cache(#[from] transcriptord_cache::CacheError),
}

struct Handles {
    /// `Some` only when `open()` connected to real Postgres/Redis; `close()`
    /// shuts these down. Test construction (`open_for_test`) leaves both
    /// `None` since the injected stores own no connection of their own.
    durable_pg: Option<Arc<PgDurableStore>>,
    ephemeral_redis: Option<Arc<RedisEphemeralStore>>,
    durable: Arc<dyn DurableStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    dispatcher: Dispatcher,
    sessions: Arc<RunnerSessionManager>,
    jobs: Arc<JobLifecycleManager>,
    mailer: Arc<dyn MailSender>,
    auth: Arc<dyn AuthProvider>,
}

struct Shared {
    config: Config,
    handles: Mutex<Option<Handles>>,
}

/// Cheap to clone: every clone shares the same handles, which is what axum's
/// `State` extractor expects.
#[derive(Clone)]
pub struct AppContext(Arc<Shared>);

impl AppContext {
    pub fn new(config: Config) -> Self {
        Self(Arc::new(Shared {
            config,
            handles: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Connects to the durable and ephemeral stores and wires the engine
    /// managers. A no-op (returns `Ok(())` immediately) if already open.
    pub async fn open(&self) -> Result<(), ContextError> {
        if self.0.handles.lock().is_some() {
            return Ok(());
        }

        let durable_pg = Arc::new(PgDurableStore::open(&self.0.config.database).await?);
        let ephemeral_redis = Arc::new(RedisEphemeralStore::open(&self.0.config.redis).await?);
        let durable: Arc<dyn DurableStore> = durable_pg.clone();
        let ephemeral: Arc<dyn EphemeralStore> = ephemeral_redis.clone();

        let dispatcher = Dispatcher::new(durable.clone(), ephemeral.clone(), self.0.config.heartbeat_timeout());
        // The concrete SMTP sender is out of scope (SPEC §1, §9); production
        // wiring logs instead of delivering.
        let mailer: Arc<dyn MailSender> = Arc::new(LoggingMailSender);
        let sessions = Arc::new(RunnerSessionManager::new(
            durable.clone(),
            ephemeral.clone(),
            dispatcher.clone(),
            mailer.clone(),
            self.0.config.heartbeat_timeout(),
        ));
        let jobs = Arc::new(JobLifecycleManager::new(durable.clone(), ephemeral.clone(), dispatcher.clone()));
        // Concrete credential verification is out of scope (SPEC §1, §9);
        // the trait boundary is wired to an empty test double here.
        let auth: Arc<dyn AuthProvider> = Arc::new(InMemoryAuthProvider::new());

        *self.0.handles.lock() = Some(Handles {
            durable_pg: Some(durable_pg),
            ephemeral_redis: Some(ephemeral_redis),
            durable,
            ephemeral,
            dispatcher,
            sessions,
            jobs,
            mailer,
            auth,
        });
        Ok(())
    }

    /// Wires the engine directly onto caller-supplied store/auth handles,
    /// skipping the Postgres/Redis connection `open()` would make. Used by
    /// HTTP-surface tests that exercise the real router against the
    /// in-memory store doubles (see `transcriptord-storage::memory` and
    /// `transcriptord-cache::memory`).
    #[cfg(feature = "test-support")]
    pub fn open_for_test(
        config: Config,
        durable: Arc<dyn DurableStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let dispatcher = Dispatcher::new(durable.clone(), ephemeral.clone(), config.heartbeat_timeout());
        let mailer: Arc<dyn MailSender> = Arc::new(LoggingMailSender);
        let sessions = Arc::new(RunnerSessionManager::new(
            durable.clone(),
            ephemeral.clone(),
            dispatcher.clone(),
            mailer.clone(),
            config.heartbeat_timeout(),
        ));
        let jobs = Arc::new(JobLifecycleManager::new(durable.clone(), ephemeral.clone(), dispatcher.clone()));

        Self(Arc::new(Shared {
            config,
            handles: Mutex::new(Some(Handles {
                durable_pg: None,
                ephemeral_redis: None,
                durable,
                ephemeral,
                dispatcher,
                sessions,
                jobs,
                mailer,
                auth,
            })),
        }))
    }

    /// Closes the underlying connections. A no-op if already closed.
    pub async fn close(&self) {
        let handles = self.0.handles.lock().take();
        let Some(handles) = handles else { return };
        if let Some(ephemeral_redis) = handles.ephemeral_redis {
            if let Err(err) = ephemeral_redis.close().await {
                tracing::warn!(%err, "error closing ephemeral store connection");
            }
        }
        if let Some(durable_pg) = handles.durable_pg {
            durable_pg.close().await;
        }
    }

    pub fn durable(&self) -> Option<Arc<dyn DurableStore>> {
        self.0.handles.lock().as_ref().map(|h| h.durable.clone())
    }

    pub fn ephemeral(&self) -> Option<Arc<dyn EphemeralStore>> {
        self.0.handles.lock().as_ref().map(|h| h.ephemeral.clone())
    }

    pub fn dispatcher(&self) -> Option<Dispatcher> {
        self.0.handles.lock().as_ref().map(|h| h.dispatcher.clone())
    }

    pub fn sessions(&self) -> Option<Arc<RunnerSessionManager>> {
        self.0.handles.lock().as_ref().map(|h| h.sessions.clone())
    }

    pub fn jobs(&self) -> Option<Arc<JobLifecycleManager>> {
        self.0.handles.lock().as_ref().map(|h| h.jobs.clone())
    }

    pub fn auth(&self) -> Option<Arc<dyn AuthProvider>> {
        self.0.handles.lock().as_ref().map(|h| h.auth.clone())
    }
}
