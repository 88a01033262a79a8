//! One adapter per signing protocol family.

mod cashdesk;
mod keyed;
mod session;
mod stamped;

pub use cashdesk::CashdeskAdapter;
pub use keyed::KeyedAdapter;
pub use session::SessionAdapter;
pub use stamped::StampedAdapter;

use crate::error::GatewayError;
use crate::types::{DepositReceipt, WithdrawReceipt};
use async_trait::async_trait;
use payment_store::PlatformId;
use rust_decimal::Decimal;

/// A platform settlement API.
///
/// `verify_and_execute` submits a player's one-time withdrawal code; for the
/// platforms behind this trait the verification call is the irreversible
/// execution, so a failed local follow-up must never re-submit it blindly.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> PlatformId;

    async fn deposit(
        &self,
        account_ref: &str,
        amount: Decimal,
    ) -> Result<DepositReceipt, GatewayError>;

    async fn verify_and_execute(
        &self,
        account_ref: &str,
        code: &str,
    ) -> Result<WithdrawReceipt, GatewayError>;
}

/// Format an amount exactly once; the same bytes go into the signature and
/// onto the wire.
pub(crate) fn amount_literal(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Drain a response body, classifying transport-level failures.
///
/// HTTP 429 becomes [`GatewayError::RateLimited`] here so every adapter
/// feeds the facade's retry predicate the same way.
pub(crate) async fn drain(
    response: reqwest::Response,
) -> Result<(reqwest::StatusCode, String), GatewayError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(GatewayError::from_transport)?;
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GatewayError::RateLimited { message: body });
    }
    Ok((status, body))
}

/// Platform-specific rate-limit phrasing seen in otherwise-200 responses.
pub(crate) fn is_rate_limit_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("too many requests") || message.contains("rate limit")
}
