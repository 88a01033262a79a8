//! Periodic expiry of stale pending deposits.
//!
//! A pending deposit older than the sweep TTL can no longer be satisfied by
//! the matcher, so each cycle fails it through the same checked transition
//! path everything else uses. Nothing is ever left silently pending.

use crate::config::SweepConfig;
use crate::notifier::PaymentEvent;
use chrono::{TimeDelta, Utc};
use payment_store::{RequestStatus, Store};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const EXPIRY_DETAIL: &str = "expired before a matching payment arrived";

pub struct Sweeper {
    store: Arc<Store>,
    config: SweepConfig,
    events: mpsc::Sender<PaymentEvent>,
}

impl Sweeper {
    pub fn new(store: Arc<Store>, config: SweepConfig, events: mpsc::Sender<PaymentEvent>) -> Self {
        Self {
            store,
            config,
            events,
        }
    }

    /// Run a single sweep cycle, returning how many requests expired.
    pub async fn sweep_once(&self) -> usize {
        let Ok(ttl) = TimeDelta::from_std(self.config.pending_ttl) else {
            return 0;
        };
        let cutoff = Utc::now() - ttl;

        let mut expired = 0;
        for request in self.store.pending_deposits().await {
            if request.created_at > cutoff {
                continue;
            }

            match self
                .store
                .commit_failure(
                    request.id,
                    RequestStatus::Failed,
                    EXPIRY_DETAIL.to_string(),
                    "sweeper",
                )
                .await
            {
                Ok(updated) => {
                    expired += 1;
                    if self
                        .events
                        .send(PaymentEvent::failed(&updated))
                        .await
                        .is_err()
                    {
                        warn!("Event channel closed, dropping expiry notification");
                    }
                }
                // Lost a race against a concurrent execution; that path
                // already owns the request's outcome.
                Err(e) => debug!("Skipping expiry of {}: {}", request.id, e),
            }
        }

        if expired > 0 {
            info!("Expired {} stale pending deposits", expired);
        }
        expired
    }

    /// Run the sweeper as a long-lived task.
    pub async fn run(&self) {
        info!(
            "Starting sweeper, interval {:?}, pending TTL {:?}",
            self.config.interval, self.config.pending_ttl
        );

        loop {
            tokio::time::sleep(self.config.interval).await;

            let stats = self.store.stats().await;
            debug!(
                "Sweep cycle: {} pending requests, {} unmatched payments",
                stats.pending_requests, stats.unmatched_payments
            );
            self.sweep_once().await;
        }
    }
}

/// Spawn the sweeper as a background task.
pub fn spawn_sweeper(
    store: Arc<Store>,
    config: SweepConfig,
    events: mpsc::Sender<PaymentEvent>,
) -> tokio::task::JoinHandle<()> {
    let sweeper = Sweeper::new(store, config, events);
    tokio::spawn(async move {
        sweeper.run().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use payment_store::{NewRequest, PlatformId, RequestKind};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn sweep_config(ttl: Duration) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(60),
            pending_ttl: ttl,
        }
    }

    async fn pending_deposit(store: &Store, age: ChronoDuration) -> uuid::Uuid {
        store
            .create_request(NewRequest {
                user_id: "u-1".into(),
                platform: PlatformId::Nova,
                account_ref: "55120".into(),
                amount: dec!(100),
                kind: RequestKind::Deposit,
                created_at: Some(Utc::now() - age),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn expires_only_requests_past_the_ttl() {
        let store = Store::in_memory();
        let stale = pending_deposit(&store, ChronoDuration::minutes(45)).await;
        let fresh = pending_deposit(&store, ChronoDuration::minutes(5)).await;

        let (tx, mut rx) = mpsc::channel(8);
        let sweeper = Sweeper::new(store.clone(), sweep_config(Duration::from_secs(30 * 60)), tx);

        assert_eq!(sweeper.sweep_once().await, 1);
        assert_eq!(
            store.request(stale).await.unwrap().status,
            RequestStatus::Failed
        );
        assert_eq!(
            store.request(fresh).await.unwrap().status,
            RequestStatus::Pending
        );
        assert!(matches!(
            rx.recv().await,
            Some(PaymentEvent::RequestFailed { .. })
        ));
    }

    #[tokio::test]
    async fn second_cycle_finds_nothing_new() {
        let store = Store::in_memory();
        pending_deposit(&store, ChronoDuration::minutes(45)).await;

        let (tx, _rx) = mpsc::channel(8);
        let sweeper = Sweeper::new(store, sweep_config(Duration::from_secs(30 * 60)), tx);

        assert_eq!(sweeper.sweep_once().await, 1);
        assert_eq!(sweeper.sweep_once().await, 0);
    }
}
