//! The post-commit email outbox (SPEC §9 "at-most-once email side effects").
//!
//! The concrete SMTP sender is out of scope (SPEC Non-goals); a logging
//! sender and a recording test double stand in for it, matching the
//! reference's behaviour of losing a notification if the process dies
//! between commit and send.

use async_trait::async_trait;
use parking_lot::Mutex;

/// A single outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: MailMessage);
}

/// Default sender when no SMTP configuration is present (SPEC §9 "an empty
/// SMTP config disables the mail outbox... falling back to the logging
/// sender").
pub struct LoggingMailSender;

#[async_trait]
impl MailSender for LoggingMailSender {
    async fn send(&self, message: MailMessage) {
        tracing::info!(to = %message.to, subject = %message.subject, "mail outbox (logging sender)");
    }
}

/// Test double that records every message sent to it.
#[derive(Default)]
pub struct RecordingMailSender {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(&self, message: MailMessage) {
        self.sent.lock().push(message);
    }
}
