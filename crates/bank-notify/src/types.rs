//! Parser types.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Banks with a known notification grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bank {
    Meridian,
    Unity,
    Crown,
}

impl Bank {
    /// Fixed order in which grammars are tried when the sender is unknown.
    pub const ALL: [Bank; 3] = [Bank::Meridian, Bank::Unity, Bank::Crown];
}

impl std::fmt::Display for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bank::Meridian => write!(f, "meridian"),
            Bank::Unity => write!(f, "unity"),
            Bank::Crown => write!(f, "crown"),
        }
    }
}

/// A successfully decoded transfer notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNotification {
    /// Transfer amount, strictly positive.
    pub amount: Decimal,
    /// Settlement time as printed by the bank, when present. This is the
    /// moment the transfer cleared, not when the notification arrived.
    pub occurred_at: Option<NaiveDateTime>,
    pub bank: Bank,
}
