//! Request lifecycle.

use serde::{Deserialize, Serialize};

/// Status of a player request.
///
/// Transitions outside [`RequestStatus::can_transition_to`] are rejected by
/// the store. `Succeeded` and `Failed` are terminal. `NeedsReview` marks an
/// ambiguous gateway outcome (no definitive remote response); automation
/// never re-executes it, only an operator resolution moves it on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Deferred,
    Succeeded,
    Failed,
    NeedsReview,
}

impl RequestStatus {
    /// Whether automation may still execute a request in this status.
    pub fn is_executable(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Deferred)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Succeeded | RequestStatus::Failed)
    }

    /// The allowed transition table.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Deferred)
                | (Deferred, Pending)
                | (Pending | Deferred, Succeeded | Failed | NeedsReview)
                | (NeedsReview, Succeeded | Failed)
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Deferred => "deferred",
            RequestStatus::Succeeded => "succeeded",
            RequestStatus::Failed => "failed",
            RequestStatus::NeedsReview => "needs_review",
        };
        write!(f, "{s}")
    }
}
