#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
//! transcriptord-cache: the ephemeral store (SPEC §4.2).
//!
//! Holds everything that is allowed to vanish on restart: online-runner
//! presence, in-process job progress, and the job event bus. Durable facts
//! (job rows, settings, audio, transcripts) live in `transcriptord-storage`
//! instead — see SPEC §3 for the durable/ephemeral split.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use memory::InMemoryEphemeralStore;
pub use redis_store::{EphemeralStoreConfig, RedisEphemeralStore};
pub use store::{EphemeralStore, EventStream};
