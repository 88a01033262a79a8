//! Core entities.

use crate::status::RequestStatus;
use bank_notify::Bank;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Betting platform a request targets. Selects the gateway adapter and the
/// credential set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    /// Cashdesk-signing family.
    Orion,
    Lunar,
    Major,
    Prime,
    /// Timestamp-signed session API.
    Astra,
    /// Shared API-key header.
    Nova,
    /// Stateful session login.
    Royal,
}

impl PlatformId {
    pub const ALL: [PlatformId; 7] = [
        PlatformId::Orion,
        PlatformId::Lunar,
        PlatformId::Major,
        PlatformId::Prime,
        PlatformId::Astra,
        PlatformId::Nova,
        PlatformId::Royal,
    ];
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlatformId::Orion => "orion",
            PlatformId::Lunar => "lunar",
            PlatformId::Major => "major",
            PlatformId::Prime => "prime",
            PlatformId::Astra => "astra",
            PlatformId::Nova => "nova",
            PlatformId::Royal => "royal",
        };
        write!(f, "{s}")
    }
}

/// Player operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Deposit,
    Withdraw,
}

/// A bank transfer observed in the operator mailbox.
///
/// Created once when a notification decodes; mutated exactly once, by the
/// success commit that links it to the request it settled. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingPayment {
    pub id: Uuid,
    pub amount: Decimal,
    pub bank: Bank,
    /// Settlement time per the bank's own notification, not arrival time.
    pub occurred_at: DateTime<Utc>,
    pub raw_excerpt: String,
    pub is_processed: bool,
    pub linked_request_id: Option<Uuid>,
}

/// A player deposit or withdrawal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub user_id: String,
    pub platform: PlatformId,
    /// The player's account on the target platform.
    pub account_ref: String,
    pub amount: Decimal,
    pub kind: RequestKind,
    pub status: RequestStatus,
    /// Bounded human-readable outcome detail for operator visibility.
    pub status_detail: Option<String>,
    pub processed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Input for creating a request. The store assigns id, status, and
/// `created_at` (overridable for backfill imports).
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub user_id: String,
    pub platform: PlatformId,
    pub account_ref: String,
    pub amount: Decimal,
    pub kind: RequestKind,
    pub created_at: Option<DateTime<Utc>>,
}
