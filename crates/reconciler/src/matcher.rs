//! Payment-to-request matching.

use crate::config::MatchingConfig;
use crate::error::AppResult;
use chrono::{TimeDelta, Utc};
use payment_store::Store;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Selects the unique pending deposit request a payment satisfies.
///
/// This is a best-effort heuristic over an ambiguous signal (bank text,
/// clock skew between payer action and delivery): a miss falls back to
/// manual reconciliation, but a hit must never credit the wrong player, so
/// the amount, ordering, and window constraints are all conjunctive.
pub struct Matcher {
    store: Arc<Store>,
    lookback_window: TimeDelta,
    max_lag: TimeDelta,
    amount_epsilon: rust_decimal::Decimal,
}

impl Matcher {
    pub fn new(store: Arc<Store>, config: MatchingConfig) -> Self {
        Self {
            store,
            lookback_window: TimeDelta::from_std(config.lookback_window)
                .unwrap_or(TimeDelta::MAX),
            max_lag: TimeDelta::from_std(config.max_lag).unwrap_or(TimeDelta::MAX),
            amount_epsilon: config.amount_epsilon,
        }
    }

    /// Find the request for a newly observed payment, if any.
    ///
    /// Idempotent entry point: an already-processed payment never matches.
    /// Ties on amount resolve to the earliest `created_at`, serving whoever
    /// paid first.
    #[instrument(skip(self))]
    pub async fn match_payment(&self, payment_id: Uuid) -> AppResult<Option<Uuid>> {
        let payment = self.store.payment(payment_id).await?;
        if payment.is_processed {
            debug!("Payment {} already processed, nothing to match", payment_id);
            return Ok(None);
        }

        let window_start = Utc::now() - self.lookback_window;

        let mut candidates = Vec::new();
        for request in self.store.pending_deposits().await {
            if request.created_at < window_start {
                continue;
            }
            // A payment that settled before the request existed cannot be
            // the one that satisfies it.
            if request.created_at > payment.occurred_at {
                continue;
            }
            if payment.occurred_at - request.created_at > self.max_lag {
                continue;
            }
            if (request.amount - payment.amount).abs() > self.amount_epsilon {
                continue;
            }
            if self.store.has_processed_payment(request.id).await {
                continue;
            }
            candidates.push(request);
        }

        candidates.sort_by_key(|r| (r.created_at, r.id));
        let matched = candidates.first().map(|r| r.id);

        match matched {
            Some(request_id) => debug!(
                "Payment {} of {} matches request {}",
                payment_id, payment.amount, request_id
            ),
            None => debug!(
                "No eligible request for payment {} of {}",
                payment_id, payment.amount
            ),
        }
        Ok(matched)
    }
}
