//! End-to-end reconciliation flow tests with a scripted gateway.

use async_trait::async_trait;
use bank_notify::Bank;
use chrono::{Duration as ChronoDuration, Utc};
use payment_store::{
    NewRequest, PlatformId, RequestKind, RequestStatus, Store,
};
use platform_gateway::adapters::PlatformAdapter;
use platform_gateway::{
    DepositReceipt, GatewayError, GatewayFacade, RetryPolicy, WithdrawReceipt,
};
use reconciler::config::MatchingConfig;
use reconciler::coordinator::{Coordinator, Outcome};
use reconciler::matcher::Matcher;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// What the scripted platform does on each call.
#[derive(Clone, Copy)]
enum Script {
    Succeed,
    Reject,
    RateLimit,
    TimeOut,
    SlowSucceed,
}

struct ScriptedPlatform {
    platform: PlatformId,
    script: Script,
    calls: AtomicU32,
}

impl ScriptedPlatform {
    fn new(platform: PlatformId, script: Script) -> Arc<Self> {
        Arc::new(Self {
            platform,
            script,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, amount: Decimal) -> Result<DepositReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Succeed => Ok(DepositReceipt {
                credited_amount: amount,
                message: None,
            }),
            Script::SlowSucceed => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(DepositReceipt {
                    credited_amount: amount,
                    message: None,
                })
            }
            Script::Reject => Err(GatewayError::Rejected {
                message: "account blocked".into(),
            }),
            Script::RateLimit => Err(GatewayError::RateLimited {
                message: "too many requests".into(),
            }),
            Script::TimeOut => Err(GatewayError::Unknown("request timed out".into())),
        }
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedPlatform {
    fn platform(&self) -> PlatformId {
        self.platform
    }

    async fn deposit(
        &self,
        _account_ref: &str,
        amount: Decimal,
    ) -> Result<DepositReceipt, GatewayError> {
        self.respond(amount).await
    }

    async fn verify_and_execute(
        &self,
        _account_ref: &str,
        _code: &str,
    ) -> Result<WithdrawReceipt, GatewayError> {
        self.respond(dec!(120)).await.map(|r| WithdrawReceipt {
            amount: r.credited_amount,
            message: r.message,
        })
    }
}

struct Harness {
    store: Arc<Store>,
    matcher: Matcher,
    coordinator: Coordinator,
    adapter: Arc<ScriptedPlatform>,
    _events: mpsc::Receiver<reconciler::notifier::PaymentEvent>,
}

fn harness(script: Script) -> Harness {
    let store = Store::in_memory();
    let adapter = ScriptedPlatform::new(PlatformId::Orion, script);
    let facade = Arc::new(GatewayFacade::from_adapters(
        vec![adapter.clone()],
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
    ));
    let (events_tx, events_rx) = mpsc::channel(64);
    Harness {
        matcher: Matcher::new(store.clone(), MatchingConfig::default()),
        coordinator: Coordinator::new(store.clone(), facade, events_tx),
        store,
        adapter,
        _events: events_rx,
    }
}

async fn create_request(store: &Store, kind: RequestKind, amount: Decimal, age_secs: i64) -> Uuid {
    store
        .create_request(NewRequest {
            user_id: "u-1".into(),
            platform: PlatformId::Orion,
            account_ref: "PLAYER77".into(),
            amount,
            kind,
            created_at: Some(Utc::now() - ChronoDuration::seconds(age_secs)),
        })
        .await
        .unwrap()
        .id
}

async fn record_payment(store: &Store, amount: Decimal, occurred_offset_secs: i64) -> Uuid {
    store
        .insert_payment(
            amount,
            Bank::Meridian,
            Utc::now() + ChronoDuration::seconds(occurred_offset_secs),
            &format!("Amount: {amount} GEL / offset {occurred_offset_secs}"),
        )
        .await
        .unwrap()
        .unwrap()
        .id
}

// Scenario A: a pending request and a payment settling shortly after it.
#[tokio::test]
async fn matched_payment_settles_the_request() {
    let h = harness(Script::Succeed);
    let request = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 30).await;
    let payment = record_payment(&h.store, dec!(500.00), 0).await;

    let matched = h.matcher.match_payment(payment).await.unwrap().unwrap();
    assert_eq!(matched, request);

    let outcome = h
        .coordinator
        .execute_deposit(request, payment, "auto")
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);

    let request = h.store.request(request).await.unwrap();
    let payment = h.store.payment(payment).await.unwrap();
    assert_eq!(request.status, RequestStatus::Succeeded);
    assert!(request.processed_at.is_some());
    assert!(payment.is_processed);
    assert_eq!(payment.linked_request_id, Some(request.id));
    assert_eq!(h.adapter.calls(), 1);
}

// Scenario B: the payment settled before the request existed.
#[tokio::test]
async fn payment_older_than_the_request_stays_unmatched() {
    let h = harness(Script::Succeed);
    create_request(&h.store, RequestKind::Deposit, dec!(500.00), 0).await;
    let payment = record_payment(&h.store, dec!(500.00), -10).await;

    let matched = h.matcher.match_payment(payment).await.unwrap();
    assert_eq!(matched, None);
    assert!(!h.store.payment(payment).await.unwrap().is_processed);
    assert_eq!(h.adapter.calls(), 0);
}

// Scenario C: two identical-amount requests; the older one wins.
#[tokio::test]
async fn one_payment_binds_to_the_oldest_of_two_requests() {
    let h = harness(Script::Succeed);
    let older = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 35).await;
    let newer = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 30).await;
    let payment = record_payment(&h.store, dec!(500.00), 0).await;

    let matched = h.matcher.match_payment(payment).await.unwrap().unwrap();
    assert_eq!(matched, older);

    h.coordinator
        .execute_deposit(older, payment, "auto")
        .await
        .unwrap();

    assert_eq!(
        h.store.request(newer).await.unwrap().status,
        RequestStatus::Pending
    );
    assert_eq!(
        h.store.payment(payment).await.unwrap().linked_request_id,
        Some(older)
    );
}

// Scenario D: persistent rate limiting exhausts the bounded retry and the
// request ends in a terminal failure, never silently pending.
#[tokio::test]
async fn rate_limit_exhaustion_fails_the_request_terminally() {
    let h = harness(Script::RateLimit);
    let request = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 30).await;
    let payment = record_payment(&h.store, dec!(500.00), 0).await;

    let outcome = h
        .coordinator
        .execute_deposit(request, payment, "auto")
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(h.adapter.calls(), 3);

    let request = h.store.request(request).await.unwrap();
    assert_eq!(request.status, RequestStatus::Failed);
    assert!(request.status_detail.is_some());
    // The payment survives for manual resolution.
    assert!(!h.store.payment(payment).await.unwrap().is_processed);
}

// Scenario E: a timeout is an unknown outcome, parked for review and never
// automatically re-executed.
#[tokio::test]
async fn unknown_outcome_parks_the_request_for_review() {
    let h = harness(Script::TimeOut);
    let request = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 30).await;
    let payment = record_payment(&h.store, dec!(500.00), 0).await;

    let outcome = h
        .coordinator
        .execute_deposit(request, payment, "auto")
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::NeedsReview);
    assert_eq!(h.adapter.calls(), 1);

    let stored = h.store.request(request).await.unwrap();
    assert_eq!(stored.status, RequestStatus::NeedsReview);
    assert!(!h.store.payment(payment).await.unwrap().is_processed);

    // A re-trigger (duplicate notification, operator refresh) is a no-op.
    let outcome = h
        .coordinator
        .execute_deposit(request, payment, "auto")
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(h.adapter.calls(), 1);
}

// Idempotence: a second invocation after success changes nothing.
#[tokio::test]
async fn repeated_execution_is_a_noop() {
    let h = harness(Script::Succeed);
    let request = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 30).await;
    let payment = record_payment(&h.store, dec!(500.00), 0).await;

    let first = h
        .coordinator
        .execute_deposit(request, payment, "auto")
        .await
        .unwrap();
    assert_eq!(first, Outcome::Completed);
    let settled = h.store.request(request).await.unwrap();

    let second = h
        .coordinator
        .execute_deposit(request, payment, "auto")
        .await
        .unwrap();
    assert_eq!(second, Outcome::Skipped);
    assert_eq!(h.adapter.calls(), 1);

    let after = h.store.request(request).await.unwrap();
    assert_eq!(after.processed_at, settled.processed_at);
}

// At-most-once under concurrency: overlapping triggers produce one remote
// call and one consumption.
#[tokio::test]
async fn concurrent_triggers_execute_the_deposit_once() {
    let h = harness(Script::SlowSucceed);
    let request = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 30).await;
    let payment = record_payment(&h.store, dec!(500.00), 0).await;

    let coordinator = Arc::new(h.coordinator);
    let a = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.execute_deposit(request, payment, "auto").await })
    };
    let b = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.execute_deposit(request, payment, "auto").await })
    };

    let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
    assert!(outcomes.contains(&Outcome::Completed));
    assert!(outcomes.contains(&Outcome::Skipped));
    assert_eq!(h.adapter.calls(), 1);

    let payment = h.store.payment(payment).await.unwrap();
    assert_eq!(payment.linked_request_id, Some(request));
}

// A payment can feed at most one request even when two requests race for it.
#[tokio::test]
async fn two_requests_cannot_consume_one_payment() {
    let h = harness(Script::SlowSucceed);
    let first = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 35).await;
    let second = create_request(&h.store, RequestKind::Deposit, dec!(500.00), 30).await;
    let payment = record_payment(&h.store, dec!(500.00), 0).await;

    let coordinator = Arc::new(h.coordinator);
    let a = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.execute_deposit(first, payment, "auto").await })
    };
    let b = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.execute_deposit(second, payment, "auto").await })
    };
    let _ = a.await.unwrap().unwrap();
    let _ = b.await.unwrap().unwrap();

    let payment = h.store.payment(payment).await.unwrap();
    assert!(payment.is_processed);
    let winner = payment.linked_request_id.unwrap();
    assert!(winner == first || winner == second);

    // Exactly one of the two requests holds the payment.
    let first = h.store.request(first).await.unwrap();
    let second = h.store.request(second).await.unwrap();
    let succeeded = [&first, &second]
        .iter()
        .filter(|r| r.status == RequestStatus::Succeeded)
        .count();
    assert_eq!(succeeded, 1);
}

// Withdrawals: verifying the code is the execution.
#[tokio::test]
async fn withdrawal_code_verification_settles_the_request() {
    let h = harness(Script::Succeed);
    let request = create_request(&h.store, RequestKind::Withdraw, dec!(120), 30).await;

    let outcome = h
        .coordinator
        .execute_withdrawal(request, "881-202", "operator-2")
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);

    let request = h.store.request(request).await.unwrap();
    assert_eq!(request.status, RequestStatus::Succeeded);
    assert_eq!(request.processed_by.as_deref(), Some("operator-2"));
    assert_eq!(h.adapter.calls(), 1);
}

// A deposit trigger against a withdrawal request is refused.
#[tokio::test]
async fn kind_mismatch_is_skipped() {
    let h = harness(Script::Succeed);
    let request = create_request(&h.store, RequestKind::Withdraw, dec!(120), 30).await;
    let payment = record_payment(&h.store, dec!(120), 0).await;

    let outcome = h
        .coordinator
        .execute_deposit(request, payment, "auto")
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(h.adapter.calls(), 0);
}

// Unconfigured platforms surface as an immediate terminal failure.
#[tokio::test]
async fn missing_credentials_fail_without_a_remote_call() {
    let store = Store::in_memory();
    let facade = Arc::new(GatewayFacade::from_adapters(vec![], RetryPolicy::default()));
    let (events_tx, _events_rx) = mpsc::channel(8);
    let coordinator = Coordinator::new(store.clone(), facade, events_tx);

    let request = create_request(&store, RequestKind::Deposit, dec!(10), 30).await;
    let payment = record_payment(&store, dec!(10), 0).await;

    let outcome = coordinator
        .execute_deposit(request, payment, "auto")
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Failed);

    let request = store.request(request).await.unwrap();
    assert_eq!(request.status, RequestStatus::Failed);
    assert!(request
        .status_detail
        .as_deref()
        .unwrap()
        .contains("not configured"));
}
