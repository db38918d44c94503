#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
//! transcriptord-engine: the orchestration layer sitting between the HTTP
//! surface and the two stores (SPEC §4.3–4.5, §4.7).
//!
//! Nothing in this crate holds authoritative state; every struct here is a
//! thin coordinator over [`transcriptord_storage::DurableStore`] and
//! [`transcriptord_cache::EphemeralStore`] handles (SPEC §9 "application
//! context").

pub mod dispatcher;
pub mod error;
pub mod job_lifecycle;
pub mod mail;
pub mod recovery;
pub mod runner_session;
#[cfg(test)]
mod test_support;
pub mod token;

pub use dispatcher::Dispatcher;
pub use error::{EngineError, EngineResult};
pub use job_lifecycle::JobLifecycleManager;
pub use mail::{LoggingMailSender, MailMessage, MailSender, RecordingMailSender};
pub use recovery::{recover, RecoveryReport};
pub use runner_session::{HeartbeatOutcome, JobOutcome, RegisteredSession, RunnerDeclaration, RunnerSessionManager};
