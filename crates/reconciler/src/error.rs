//! Application error types.

use thiserror::Error;

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] mailbox_client::MailboxError),

    #[error("Store error: {0}")]
    Store(#[from] payment_store::StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] platform_gateway::GatewayError),
}

/// Result type alias for application errors.
pub type AppResult<T> = Result<T, AppError>;
