//! Reconciliation state with snapshot persistence.

use crate::error::StoreError;
use crate::status::RequestStatus;
use crate::types::{IncomingPayment, NewRequest, Request, RequestKind};
use bank_notify::Bank;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Schema version for migrations.
const DATA_VERSION: u32 = 1;

/// Maximum bytes of notification text kept on a payment record.
const RAW_EXCERPT_MAX: usize = 120;

/// Maximum length of `status_detail` stored on a request.
const STATUS_DETAIL_MAX: usize = 200;

/// Persistent snapshot of the reconciliation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreData {
    version: u32,
    requests: HashMap<uuid::Uuid, Request>,
    payments: HashMap<uuid::Uuid, IncomingPayment>,
    /// Fingerprints of notifications already recorded as payments.
    seen_notifications: HashSet<String>,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            version: DATA_VERSION,
            requests: HashMap::new(),
            payments: HashMap::new(),
            seen_notifications: HashSet::new(),
        }
    }
}

/// Summary counters for logging and the sweep cycle.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_requests: usize,
    pub pending_requests: usize,
    pub total_payments: usize,
    pub unmatched_payments: usize,
}

/// Single source of truth for requests and payments.
///
/// All state lives behind one `RwLock`; the commit operations re-validate
/// inside the write lock, which is what makes the request transition and
/// the payment consumption one indivisible unit.
pub struct Store {
    data: RwLock<StoreData>,
    storage_path: Option<PathBuf>,
}

impl Store {
    /// Open the store, loading a previous snapshot when one exists.
    pub async fn open(storage_path: PathBuf) -> Result<Arc<Self>, StoreError> {
        let store = Arc::new(Self {
            data: RwLock::new(StoreData::default()),
            storage_path: Some(storage_path),
        });
        store.load().await?;
        Ok(store)
    }

    /// Purely in-memory store for tests and embedded use.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(StoreData::default()),
            storage_path: None,
        })
    }

    async fn load(&self) -> Result<(), StoreError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };
        if !path.exists() {
            info!("No state snapshot at {:?}, starting fresh", path);
            return Ok(());
        }

        let raw = fs::read(path).await?;
        let data: StoreData = serde_json::from_slice(&raw)?;
        info!(
            "Loaded state snapshot: {} requests, {} payments",
            data.requests.len(),
            data.payments.len()
        );
        *self.data.write().await = data;
        Ok(())
    }

    /// Write the whole state out via temp file + rename.
    async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        let serialized = {
            let data = self.data.read().await;
            serde_json::to_vec(&*data)?
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &serialized).await?;
        fs::rename(&temp_path, path).await?;

        debug!("Saved state snapshot ({} bytes) to {:?}", serialized.len(), path);
        Ok(())
    }

    /// Create a request on behalf of the presentation layer. The core only
    /// ever transitions requests, it never originates them.
    pub async fn create_request(&self, new: NewRequest) -> Result<Request, StoreError> {
        let request = Request {
            id: uuid::Uuid::new_v4(),
            user_id: new.user_id,
            platform: new.platform,
            account_ref: new.account_ref,
            amount: new.amount,
            kind: new.kind,
            status: RequestStatus::Pending,
            status_detail: None,
            processed_by: None,
            created_at: new.created_at.unwrap_or_else(Utc::now),
            processed_at: None,
        };
        {
            let mut data = self.data.write().await;
            data.requests.insert(request.id, request.clone());
        }
        self.persist().await?;
        Ok(request)
    }

    pub async fn request(&self, id: uuid::Uuid) -> Result<Request, StoreError> {
        let data = self.data.read().await;
        data.requests
            .get(&id)
            .cloned()
            .ok_or(StoreError::RequestNotFound(id))
    }

    pub async fn payment(&self, id: uuid::Uuid) -> Result<IncomingPayment, StoreError> {
        let data = self.data.read().await;
        data.payments
            .get(&id)
            .cloned()
            .ok_or(StoreError::PaymentNotFound(id))
    }

    /// Record a payment decoded from a notification.
    ///
    /// Returns `None` when the notification fingerprint was seen before, so
    /// duplicate mailbox delivery can never create a second payment record.
    pub async fn insert_payment(
        &self,
        amount: Decimal,
        bank: Bank,
        occurred_at: DateTime<Utc>,
        raw_text: &str,
    ) -> Result<Option<IncomingPayment>, StoreError> {
        let fingerprint = notification_fingerprint(bank, raw_text);

        let inserted = {
            let mut data = self.data.write().await;
            if !data.seen_notifications.insert(fingerprint) {
                None
            } else {
                let payment = IncomingPayment {
                    id: uuid::Uuid::new_v4(),
                    amount,
                    bank,
                    occurred_at,
                    raw_excerpt: truncate(raw_text, RAW_EXCERPT_MAX),
                    is_processed: false,
                    linked_request_id: None,
                };
                data.payments.insert(payment.id, payment.clone());
                Some(payment)
            }
        };

        if inserted.is_some() {
            self.persist().await?;
        }
        Ok(inserted)
    }

    /// Pending deposit requests, unordered.
    pub async fn pending_deposits(&self) -> Vec<Request> {
        let data = self.data.read().await;
        data.requests
            .values()
            .filter(|r| r.kind == RequestKind::Deposit && r.status == RequestStatus::Pending)
            .cloned()
            .collect()
    }

    /// Whether a processed payment is already attached to this request.
    pub async fn has_processed_payment(&self, request_id: uuid::Uuid) -> bool {
        let data = self.data.read().await;
        data.payments
            .values()
            .any(|p| p.is_processed && p.linked_request_id == Some(request_id))
    }

    /// Payments awaiting manual reconciliation.
    pub async fn unprocessed_payments(&self) -> Vec<IncomingPayment> {
        let data = self.data.read().await;
        data.payments
            .values()
            .filter(|p| !p.is_processed)
            .cloned()
            .collect()
    }

    /// Atomically mark the request succeeded and consume the payment.
    ///
    /// Re-validates both records under the write lock; an already-committed
    /// identical outcome is a no-op so the coordinator's read-back path can
    /// call this again safely.
    pub async fn commit_deposit_success(
        &self,
        request_id: uuid::Uuid,
        payment_id: uuid::Uuid,
        processed_by: &str,
        detail: Option<String>,
    ) -> Result<Request, StoreError> {
        let committed = {
            let mut data = self.data.write().await;

            let request = data
                .requests
                .get(&request_id)
                .ok_or(StoreError::RequestNotFound(request_id))?;
            let payment = data
                .payments
                .get(&payment_id)
                .ok_or(StoreError::PaymentNotFound(payment_id))?;

            let already_committed = request.status == RequestStatus::Succeeded
                && payment.is_processed
                && payment.linked_request_id == Some(request_id);

            if !already_committed {
                if !request.status.can_transition_to(RequestStatus::Succeeded) {
                    return Err(StoreError::InvalidTransition {
                        from: request.status,
                        to: RequestStatus::Succeeded,
                    });
                }
                if payment.is_processed || payment.linked_request_id.is_some() {
                    return Err(StoreError::PaymentConsumed(payment_id));
                }

                let request = data
                    .requests
                    .get_mut(&request_id)
                    .ok_or(StoreError::RequestNotFound(request_id))?;
                apply_success(request, processed_by, detail);

                let payment = data
                    .payments
                    .get_mut(&payment_id)
                    .ok_or(StoreError::PaymentNotFound(payment_id))?;
                payment.is_processed = true;
                payment.linked_request_id = Some(request_id);
            }

            data.requests
                .get(&request_id)
                .cloned()
                .ok_or(StoreError::RequestNotFound(request_id))?
        };

        self.persist().await?;
        Ok(committed)
    }

    /// Success commit for operations that consume no payment (withdrawals).
    pub async fn commit_success(
        &self,
        request_id: uuid::Uuid,
        processed_by: &str,
        detail: Option<String>,
    ) -> Result<Request, StoreError> {
        let committed = {
            let mut data = self.data.write().await;
            let request = data
                .requests
                .get_mut(&request_id)
                .ok_or(StoreError::RequestNotFound(request_id))?;

            if request.status != RequestStatus::Succeeded {
                if !request.status.can_transition_to(RequestStatus::Succeeded) {
                    return Err(StoreError::InvalidTransition {
                        from: request.status,
                        to: RequestStatus::Succeeded,
                    });
                }
                apply_success(request, processed_by, detail);
            }
            request.clone()
        };

        self.persist().await?;
        Ok(committed)
    }

    /// Terminal failure or needs-review commit. The payment, if any was
    /// proposed, stays unconsumed and eligible for manual resolution.
    pub async fn commit_failure(
        &self,
        request_id: uuid::Uuid,
        status: RequestStatus,
        detail: String,
        processed_by: &str,
    ) -> Result<Request, StoreError> {
        debug_assert!(matches!(
            status,
            RequestStatus::Failed | RequestStatus::NeedsReview
        ));

        let committed = {
            let mut data = self.data.write().await;
            let request = data
                .requests
                .get_mut(&request_id)
                .ok_or(StoreError::RequestNotFound(request_id))?;

            // Re-entrant attempts on an already-identical outcome are no-ops.
            if request.status != status {
                if !request.status.can_transition_to(status) {
                    return Err(StoreError::InvalidTransition {
                        from: request.status,
                        to: status,
                    });
                }

                request.status = status;
                request.status_detail = Some(truncate(&detail, STATUS_DETAIL_MAX));
                request.processed_by = Some(processed_by.to_string());
                request.processed_at = Some(Utc::now());
            }
            request.clone()
        };

        self.persist().await?;
        Ok(committed)
    }

    /// Corrective repair: force the success outcome onto a request whose
    /// local state was overwritten after the platform already confirmed the
    /// transfer. Bypasses the transition table, but still refuses to steal a
    /// payment that another request consumed.
    pub async fn force_deposit_success(
        &self,
        request_id: uuid::Uuid,
        payment_id: uuid::Uuid,
        processed_by: &str,
        detail: Option<String>,
    ) -> Result<Request, StoreError> {
        let committed = {
            let mut data = self.data.write().await;

            let payment = data
                .payments
                .get(&payment_id)
                .ok_or(StoreError::PaymentNotFound(payment_id))?;
            if let Some(linked) = payment.linked_request_id {
                if linked != request_id {
                    return Err(StoreError::PaymentConsumed(payment_id));
                }
            }

            let request = data
                .requests
                .get_mut(&request_id)
                .ok_or(StoreError::RequestNotFound(request_id))?;
            warn!(
                "Forcing settled outcome onto request {} (was {})",
                request_id, request.status
            );
            apply_success(request, processed_by, detail);

            let payment = data
                .payments
                .get_mut(&payment_id)
                .ok_or(StoreError::PaymentNotFound(payment_id))?;
            payment.is_processed = true;
            payment.linked_request_id = Some(request_id);

            data.requests
                .get(&request_id)
                .cloned()
                .ok_or(StoreError::RequestNotFound(request_id))?
        };

        self.persist().await?;
        Ok(committed)
    }

    /// Payment-less variant of [`Store::force_deposit_success`].
    pub async fn force_success(
        &self,
        request_id: uuid::Uuid,
        processed_by: &str,
        detail: Option<String>,
    ) -> Result<Request, StoreError> {
        let committed = {
            let mut data = self.data.write().await;
            let request = data
                .requests
                .get_mut(&request_id)
                .ok_or(StoreError::RequestNotFound(request_id))?;
            warn!(
                "Forcing settled outcome onto request {} (was {})",
                request_id, request.status
            );
            apply_success(request, processed_by, detail);
            request.clone()
        };

        self.persist().await?;
        Ok(committed)
    }

    /// Append an operator-visible note without a status transition.
    pub async fn annotate(&self, request_id: uuid::Uuid, note: &str) -> Result<(), StoreError> {
        {
            let mut data = self.data.write().await;
            let request = data
                .requests
                .get_mut(&request_id)
                .ok_or(StoreError::RequestNotFound(request_id))?;
            let combined = match request.status_detail.take() {
                Some(existing) => format!("{existing}; {note}"),
                None => note.to_string(),
            };
            request.status_detail = Some(truncate(&combined, STATUS_DETAIL_MAX));
        }
        self.persist().await?;
        Ok(())
    }

    pub async fn stats(&self) -> StoreStats {
        let data = self.data.read().await;
        StoreStats {
            total_requests: data.requests.len(),
            pending_requests: data
                .requests
                .values()
                .filter(|r| r.status == RequestStatus::Pending)
                .count(),
            total_payments: data.payments.len(),
            unmatched_payments: data.payments.values().filter(|p| !p.is_processed).count(),
        }
    }
}

fn apply_success(request: &mut Request, processed_by: &str, detail: Option<String>) {
    request.status = RequestStatus::Succeeded;
    request.status_detail = detail.map(|d| truncate(&d, STATUS_DETAIL_MAX));
    request.processed_by = Some(processed_by.to_string());
    request.processed_at = Some(Utc::now());
}

fn notification_fingerprint(bank: Bank, raw_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bank.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(raw_text.as_bytes());
    hex::encode(hasher.finalize())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
