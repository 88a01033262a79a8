//! Mailbox relay types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A message fetched from the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct MailMessage {
    /// Relay-assigned message id, stable across fetches.
    pub uid: String,
    pub from: String,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    /// When the relay received the message. Used as the settlement time
    /// fallback for notifications that carry no timestamp of their own.
    pub received_at: DateTime<Utc>,
}
