// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! transcriptord-storage: the durable store (SPEC §4.1).
//!
//! Authoritative state lives here: users, jobs, settings, runner identities,
//! transcripts, cleanup bookkeeping. Everything is transactional; the
//! [`DurableStore`] trait is the contract the engine depends on, with
//! [`pg::PgDurableStore`] as the production adapter and [`memory::InMemoryDurableStore`]
//! as a test double exercising the same invariants in-process.

pub mod error;
pub mod memory;
pub mod pg;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use pg::{DurableStoreConfig, PgDurableStore};
pub use store::DurableStore;
pub use types::{
    AudioStream, CleanupReport, RetentionWarningKind, UnfinishedJob, UserRetentionWarning,
    UsersCleanupOutcome,
};
