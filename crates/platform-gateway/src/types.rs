//! Normalized call results.

use rust_decimal::Decimal;

/// Outcome of a successful deposit call.
#[derive(Debug, Clone)]
pub struct DepositReceipt {
    /// Amount the platform reports as credited.
    pub credited_amount: Decimal,
    pub message: Option<String>,
}

/// Outcome of a successful withdrawal verify-and-execute call.
///
/// For every platform behind this type, verifying the player's code is the
/// execution: the money has moved by the time this value exists.
#[derive(Debug, Clone)]
pub struct WithdrawReceipt {
    pub amount: Decimal,
    pub message: Option<String>,
}
