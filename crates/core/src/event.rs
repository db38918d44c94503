//! Event-bus payloads (SPEC §4.6).

use crate::ids::{JobId, UserId};
use serde::{Deserialize, Serialize};

/// The three kinds of job-state notification carried over a user's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobCreated,
    JobUpdated,
    JobDeleted,
}

crate::simple_display! {
    EventKind {
        JobCreated => "job_created",
        JobUpdated => "job_updated",
        JobDeleted => "job_deleted",
    }
}

/// A fact published to a user's event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub user_id: UserId,
    pub job_id: JobId,
    pub kind: EventKind,
}

impl DomainEvent {
    pub fn new(user_id: UserId, job_id: JobId, kind: EventKind) -> Self {
        Self {
            user_id,
            job_id,
            kind,
        }
    }

    /// The deterministic per-user pub/sub channel name (SPEC §4.6, §6).
    pub fn channel_name(user_id: UserId) -> String {
        format!("job_events:{}", user_id.get())
    }

    /// SSE wire framing: `event: <kind>\ndata: <job_id>\n\n` (SPEC §6).
    pub fn to_sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind, self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_is_deterministic_from_user_id() {
        assert_eq!(DomainEvent::channel_name(UserId::new(7)), "job_events:7");
    }

    #[test]
    fn sse_frame_matches_wire_format() {
        let event = DomainEvent::new(UserId::new(7), JobId::new(42), EventKind::JobUpdated);
        assert_eq!(event.to_sse_frame(), "event: job_updated\ndata: 42\n\n");
    }
}
