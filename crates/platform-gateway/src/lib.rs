//! Betting-platform gateway: signing adapters and the routing facade.
//!
//! Each supported platform speaks one of four signing protocols. The
//! adapters reproduce their wire formats byte for byte; the facade routes
//! by [`payment_store::PlatformId`], retries only rate-limited responses,
//! and normalizes every outcome into [`GatewayError`] or a receipt type so
//! callers never see a raw transport error.
//!
//! Deposits are irreversible remote calls: nothing in this crate retries an
//! ambiguous outcome, and a timeout surfaces as [`GatewayError::Unknown`]
//! rather than a failure.

pub mod adapters;
mod credentials;
mod error;
mod facade;
mod retry;
mod types;

pub use adapters::PlatformAdapter;
pub use credentials::{
    CashdeskCredentials, GatewayCredentials, KeyedCredentials, SessionCredentials,
    StampedCredentials,
};
pub use error::GatewayError;
pub use facade::GatewayFacade;
pub use retry::RetryPolicy;
pub use types::{DepositReceipt, WithdrawReceipt};
