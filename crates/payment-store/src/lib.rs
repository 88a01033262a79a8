//! Entities and transactional state for payment reconciliation.
//!
//! The store is the single source of truth for deposit/withdraw requests
//! and observed bank payments. Every money-moving state change goes through
//! the commit operations here, which re-validate under one write lock so
//! that a request reaches a terminal status at most once and a payment is
//! consumed by at most one request, no matter how many triggers overlap.

mod error;
mod status;
mod store;
mod types;

pub use error::StoreError;
pub use status::RequestStatus;
pub use store::{Store, StoreStats};
pub use types::{IncomingPayment, NewRequest, PlatformId, Request, RequestKind};
