//! Store error types.

use crate::status::RequestStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    /// The payment is already consumed or linked to another request.
    #[error("payment already consumed: {0}")]
    PaymentConsumed(Uuid),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
