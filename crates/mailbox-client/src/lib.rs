//! Client for the mailbox relay that fronts the operator inbox.
//!
//! The relay exposes unseen messages over REST; this crate wraps it in a
//! typed client plus a polling receiver that yields messages as an async
//! stream. Consumers mark each message seen exactly once after handling it.

mod client;
mod error;
mod receiver;
mod types;

pub use client::MailboxClient;
pub use error::MailboxError;
pub use receiver::MessageReceiver;
pub use types::MailMessage;
