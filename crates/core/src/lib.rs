// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! transcriptord-core: domain types for the transcription control plane.
//!
//! No I/O lives here — just the entities, their invariants, and the pure
//! state-machine transitions every other crate builds on.

pub mod macros;

pub mod clock;
pub mod error;
pub mod event;
pub mod ids;
pub mod job;
pub mod runner;
pub mod settings;
pub mod transcript;
pub mod user;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use event::{DomainEvent, EventKind};
pub use ids::{JobId, RunnerId, SettingsId, UserId};
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{AudioHandle, Job, JobStatus, RunnerSnapshot};
pub use runner::{InProcessJob, OnlineRunner, RunnerIdentity};
#[cfg(any(test, feature = "test-support"))]
pub use settings::JobSettingsBuilder;
pub use settings::{DecoderParams, JobSettings};
pub use transcript::{Rendered, Segment, Transcript, TranscriptFormat};
pub use user::{
    AuthProvider, InMemoryAuthProvider, LdapAccount, LocalAccount, LoginContext, OidcAccount,
    UserCore, UserIdentity,
};
