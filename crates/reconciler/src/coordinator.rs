//! Transactional execution of requests against the gateway.
//!
//! The coordinator is the single serialization point for money movement:
//! overlapping triggers (matcher, operator action, duplicate delivery)
//! serialize on a per-request lock, re-read state before acting, and commit
//! the outcome to the request and the payment as one unit. An external call
//! is attempted at most once per (request, payment) pair; ambiguous
//! outcomes are parked for manual review, never retried automatically.

use crate::error::AppResult;
use crate::notifier::PaymentEvent;
use payment_store::{Request, RequestKind, RequestStatus, Store};
use platform_gateway::{GatewayError, GatewayFacade};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Result of one coordinator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Money moved and both records were committed.
    Completed,
    /// The request or payment was no longer executable; nothing was done.
    Skipped,
    /// The platform declined or the call was misconfigured; terminal.
    Failed,
    /// No definitive platform response; parked for manual review.
    NeedsReview,
    /// The local record could not be made to reflect a successful external
    /// call even after one corrective re-write. Funds may have moved.
    ConsistencyFault,
}

pub struct Coordinator {
    store: Arc<Store>,
    gateway: Arc<GatewayFacade>,
    events: mpsc::Sender<PaymentEvent>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(
        store: Arc<Store>,
        gateway: Arc<GatewayFacade>,
        events: mpsc::Sender<PaymentEvent>,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn request_lock(&self, request_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(request_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Execute a matched deposit against the target platform.
    #[instrument(skip(self))]
    pub async fn execute_deposit(
        &self,
        request_id: Uuid,
        payment_id: Uuid,
        processed_by: &str,
    ) -> AppResult<Outcome> {
        let lock = self.request_lock(request_id).await;
        let _guard = lock.lock().await;

        // Re-read inside the lock: a concurrent trigger may have finished
        // this request while we waited.
        let request = self.store.request(request_id).await?;
        if !request.status.is_executable() {
            debug!(
                "Request {} is {}, nothing to execute",
                request_id, request.status
            );
            return Ok(Outcome::Skipped);
        }
        if request.kind != RequestKind::Deposit {
            warn!("Request {} is not a deposit, refusing to execute", request_id);
            return Ok(Outcome::Skipped);
        }
        let payment = self.store.payment(payment_id).await?;
        if payment.is_processed {
            debug!("Payment {} already consumed, skipping", payment_id);
            return Ok(Outcome::Skipped);
        }

        info!(
            "Depositing {} to {} on {} for request {}",
            request.amount, request.account_ref, request.platform, request_id
        );

        match self
            .gateway
            .deposit(request.platform, &request.account_ref, request.amount)
            .await
        {
            Ok(receipt) => {
                self.finalize_deposit(&request, payment_id, processed_by, receipt.message)
                    .await
            }
            Err(GatewayError::Unknown(message)) => {
                let detail = format!("no definitive platform response: {message}");
                let updated = self
                    .store
                    .commit_failure(request_id, RequestStatus::NeedsReview, detail, processed_by)
                    .await?;
                self.emit(PaymentEvent::needs_review(&updated)).await;
                Ok(Outcome::NeedsReview)
            }
            Err(err) => {
                let updated = self
                    .store
                    .commit_failure(request_id, RequestStatus::Failed, err.to_string(), processed_by)
                    .await?;
                self.emit(PaymentEvent::failed(&updated)).await;
                Ok(Outcome::Failed)
            }
        }
    }

    /// Submit a player's withdrawal code. Verification is the execution on
    /// every supported platform, so this follows the same terminal-commit
    /// discipline as deposits.
    #[instrument(skip(self, code))]
    pub async fn execute_withdrawal(
        &self,
        request_id: Uuid,
        code: &str,
        processed_by: &str,
    ) -> AppResult<Outcome> {
        let lock = self.request_lock(request_id).await;
        let _guard = lock.lock().await;

        let request = self.store.request(request_id).await?;
        if !request.status.is_executable() {
            debug!(
                "Request {} is {}, nothing to execute",
                request_id, request.status
            );
            return Ok(Outcome::Skipped);
        }
        if request.kind != RequestKind::Withdraw {
            warn!("Request {} is not a withdrawal, refusing to execute", request_id);
            return Ok(Outcome::Skipped);
        }

        info!(
            "Paying out {} from {} on {} for request {}",
            request.amount, request.account_ref, request.platform, request_id
        );

        match self
            .gateway
            .verify_and_execute(request.platform, &request.account_ref, code)
            .await
        {
            Ok(receipt) => {
                self.finalize_withdrawal(&request, processed_by, receipt.message)
                    .await
            }
            Err(GatewayError::Unknown(message)) => {
                // The code may already be consumed on the platform side;
                // re-submitting it blindly is exactly what must not happen.
                let detail = format!("no definitive platform response: {message}");
                let updated = self
                    .store
                    .commit_failure(request_id, RequestStatus::NeedsReview, detail, processed_by)
                    .await?;
                self.emit(PaymentEvent::needs_review(&updated)).await;
                Ok(Outcome::NeedsReview)
            }
            Err(err) => {
                let updated = self
                    .store
                    .commit_failure(request_id, RequestStatus::Failed, err.to_string(), processed_by)
                    .await?;
                self.emit(PaymentEvent::failed(&updated)).await;
                Ok(Outcome::Failed)
            }
        }
    }

    /// Commit a settled deposit, then read back and verify. The platform
    /// has already moved the money, so a record that fails to reflect it
    /// gets exactly one corrective re-write before the condition is raised
    /// as a consistency fault for operator alerting.
    async fn finalize_deposit(
        &self,
        request: &Request,
        payment_id: Uuid,
        processed_by: &str,
        detail: Option<String>,
    ) -> AppResult<Outcome> {
        if let Err(e) = self
            .store
            .commit_deposit_success(request.id, payment_id, processed_by, detail.clone())
            .await
        {
            warn!("Success commit for request {} failed: {}", request.id, e);
        }

        for attempt in 0..2 {
            let seen = self.store.request(request.id).await?;
            let linked = self.store.payment(payment_id).await?;
            if seen.status == RequestStatus::Succeeded
                && linked.is_processed
                && linked.linked_request_id == Some(request.id)
            {
                if attempt > 0 {
                    warn!("Corrective re-write restored request {}", request.id);
                }
                self.emit(PaymentEvent::deposit_settled(&seen)).await;
                return Ok(Outcome::Completed);
            }

            if attempt == 0 {
                warn!(
                    "Request {} does not reflect its settled deposit (status {}), re-writing once",
                    request.id, seen.status
                );
                if let Err(e) = self
                    .store
                    .force_deposit_success(request.id, payment_id, processed_by, detail.clone())
                    .await
                {
                    warn!("Corrective re-write for request {} failed: {}", request.id, e);
                }
            }
        }

        error!(
            "CONSISTENCY FAULT: platform confirmed deposit for request {} but local state \
             could not be updated; manual intervention required",
            request.id
        );
        self.store
            .annotate(
                request.id,
                "consistency fault: platform confirmed deposit, local state inconsistent",
            )
            .await?;
        self.emit(PaymentEvent::consistency_fault(request)).await;
        Ok(Outcome::ConsistencyFault)
    }

    async fn finalize_withdrawal(
        &self,
        request: &Request,
        processed_by: &str,
        detail: Option<String>,
    ) -> AppResult<Outcome> {
        if let Err(e) = self
            .store
            .commit_success(request.id, processed_by, detail.clone())
            .await
        {
            warn!("Success commit for request {} failed: {}", request.id, e);
        }

        for attempt in 0..2 {
            let seen = self.store.request(request.id).await?;
            if seen.status == RequestStatus::Succeeded {
                if attempt > 0 {
                    warn!("Corrective re-write restored request {}", request.id);
                }
                self.emit(PaymentEvent::withdrawal_settled(&seen)).await;
                return Ok(Outcome::Completed);
            }

            if attempt == 0 {
                warn!(
                    "Request {} does not reflect its settled payout (status {}), re-writing once",
                    request.id, seen.status
                );
                if let Err(e) = self
                    .store
                    .force_success(request.id, processed_by, detail.clone())
                    .await
                {
                    warn!("Corrective re-write for request {} failed: {}", request.id, e);
                }
            }
        }

        error!(
            "CONSISTENCY FAULT: platform confirmed payout for request {} but local state \
             could not be updated; manual intervention required",
            request.id
        );
        self.store
            .annotate(
                request.id,
                "consistency fault: platform confirmed payout, local state inconsistent",
            )
            .await?;
        self.emit(PaymentEvent::consistency_fault(request)).await;
        Ok(Outcome::ConsistencyFault)
    }

    async fn emit(&self, event: PaymentEvent) {
        // Events fire only after the commit; a full or closed channel must
        // never unwind the money-moving path.
        if self.events.send(event).await.is_err() {
            warn!("Event channel closed, dropping notification");
        }
    }
}
