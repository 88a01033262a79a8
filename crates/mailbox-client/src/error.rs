//! Mailbox client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),
}
