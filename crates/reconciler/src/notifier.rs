//! Post-commit event notifications.
//!
//! Events are emitted only after the money-moving transaction commits and
//! are consumed here asynchronously, so a notification failure can never
//! roll back or block the transaction that produced it.

use crate::config::NotifyConfig;
use crate::error::AppResult;
use payment_store::{PlatformId, Request};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome event for a request, emitted after its terminal commit.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    DepositSettled {
        request_id: Uuid,
        user_id: String,
        platform: PlatformId,
        amount: Decimal,
    },
    WithdrawalSettled {
        request_id: Uuid,
        user_id: String,
        platform: PlatformId,
        amount: Decimal,
    },
    RequestFailed {
        request_id: Uuid,
        user_id: String,
        detail: String,
    },
    RequestNeedsReview {
        request_id: Uuid,
        user_id: String,
        detail: String,
    },
    ConsistencyFault {
        request_id: Uuid,
        user_id: String,
    },
}

impl PaymentEvent {
    pub fn deposit_settled(request: &Request) -> Self {
        PaymentEvent::DepositSettled {
            request_id: request.id,
            user_id: request.user_id.clone(),
            platform: request.platform,
            amount: request.amount,
        }
    }

    pub fn withdrawal_settled(request: &Request) -> Self {
        PaymentEvent::WithdrawalSettled {
            request_id: request.id,
            user_id: request.user_id.clone(),
            platform: request.platform,
            amount: request.amount,
        }
    }

    pub fn failed(request: &Request) -> Self {
        PaymentEvent::RequestFailed {
            request_id: request.id,
            user_id: request.user_id.clone(),
            detail: request.status_detail.clone().unwrap_or_default(),
        }
    }

    pub fn needs_review(request: &Request) -> Self {
        PaymentEvent::RequestNeedsReview {
            request_id: request.id,
            user_id: request.user_id.clone(),
            detail: request.status_detail.clone().unwrap_or_default(),
        }
    }

    pub fn consistency_fault(request: &Request) -> Self {
        PaymentEvent::ConsistencyFault {
            request_id: request.id,
            user_id: request.user_id.clone(),
        }
    }
}

/// Asynchronous consumer of [`PaymentEvent`]s.
pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(config: &NotifyConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("webhook client: {e}"))?;

        Ok(Self {
            webhook_url: config.webhook_url.clone(),
            client,
        })
    }

    /// Drain the event channel until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<PaymentEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(&event).await;
        }
        debug!("Event channel closed, notifier stopping");
    }

    async fn dispatch(&self, event: &PaymentEvent) {
        info!(?event, "Payment event");

        let Some(url) = &self.webhook_url else {
            return;
        };
        match self.client.post(url).json(event).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Webhook delivered");
            }
            Ok(response) => {
                warn!("Webhook returned {}", response.status());
            }
            Err(e) => {
                warn!("Webhook delivery failed: {}", e);
            }
        }
    }
}
