//! Supporting types for the [`crate::DurableStore`] contract that don't
//! belong on the pure domain entities in `transcriptord-core`.

use futures_util::stream::BoxStream;
use transcriptord_core::{JobId, UserId};

use crate::error::StorageError;

/// A lazily-read, restartable stream of audio bytes, chunked the same way
/// on read as on write (SPEC §4.1 `get_job_audio`).
pub type AudioStream = BoxStream<'static, Result<Vec<u8>, StorageError>>;

/// Row shape returned by `get_all_unfinished_jobs`, used only for recovery
/// (SPEC §4.1, §4.7) — deliberately narrower than the full `Job` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnfinishedJob {
    pub job_id: JobId,
    pub user_id: UserId,
    pub aborting: bool,
}

/// Which retention boundary a cleanup-triggered warning email corresponds to
/// (SPEC §4.1 "Cleanup" / "Users" task).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionWarningKind {
    ThirtyDays,
    SevenDays,
}

/// A user about to be deleted by the "users" cleanup task who should first
/// receive an account-deletion warning email via the mail outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRetentionWarning {
    pub user_id: UserId,
    pub email: String,
    pub kind: RetentionWarningKind,
}

/// Summary of what a cleanup task run did, logged by the caller at `info`
/// level (SPEC §4.1 "each task run is logged").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub ran: bool,
    pub rows_affected: u64,
}

impl CleanupReport {
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn ran(rows_affected: u64) -> Self {
        Self {
            ran: true,
            rows_affected,
        }
    }
}

/// Result of "users" cleanup specifically: a report plus the warnings that
/// must be enqueued onto the mail outbox *before* the affected rows are
/// deleted (SPEC §4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsersCleanupOutcome {
    pub report: CleanupReport,
    pub warnings: Vec<UserRetentionWarning>,
}
