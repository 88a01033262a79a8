//! Payment reconciler - main entry point.

use chrono::{TimeZone, Utc};
use mailbox_client::{MailMessage, MailboxClient, MessageReceiver};
use payment_store::Store;
use platform_gateway::GatewayFacade;
use reconciler::config::Config;
use reconciler::coordinator::Coordinator;
use reconciler::error::AppResult;
use reconciler::matcher::Matcher;
use reconciler::notifier::Notifier;
use reconciler::sweeper::spawn_sweeper;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Attribution recorded on requests the automatic pipeline settles.
const AUTO_OPERATOR: &str = "auto-reconciler";

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.log_level);

    info!("Starting payment reconciler...");

    // Open state
    let store = Store::open(config.store.storage_path.clone()).await?;
    let stats = store.stats().await;
    info!(
        "State loaded: {} requests ({} pending), {} payments ({} unmatched)",
        stats.total_requests, stats.pending_requests, stats.total_payments,
        stats.unmatched_payments
    );

    // Build gateway adapters from configured credentials
    let gateway = Arc::new(GatewayFacade::from_credentials(
        config.gateway.credentials.clone(),
        config.gateway.retry.clone(),
        config.gateway.connect_timeout,
        config.gateway.request_timeout,
    )?);
    let platforms = gateway.configured_platforms();
    if platforms.is_empty() {
        warn!("No platform credentials configured; deposits will fail until some are");
    } else {
        info!("Gateway ready for platforms: {:?}", platforms);
    }

    // Mailbox relay
    let mailbox = MailboxClient::new(&config.mailbox.service_url, config.mailbox.api_token.clone())?;
    if !mailbox.health_check().await {
        error!(
            "Mailbox relay not reachable at {}",
            config.mailbox.service_url
        );
        return Err(anyhow::anyhow!("mailbox relay not reachable").into());
    }
    info!("Mailbox relay healthy");

    // Post-commit notifier
    let (events_tx, events_rx) = mpsc::channel(64);
    let notifier = Notifier::new(&config.notify)?;
    let notifier_handle = tokio::spawn(notifier.run(events_rx));

    // Matching and execution
    let matcher = Matcher::new(store.clone(), config.matching.clone());
    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        gateway.clone(),
        events_tx.clone(),
    ));

    // Background expiry sweep
    let sweeper = spawn_sweeper(store.clone(), config.sweep.clone(), events_tx.clone());

    // Start message receiver
    let receiver = MessageReceiver::new(mailbox.clone(), config.mailbox.poll_interval);
    let mut stream = Box::pin(receiver.stream());
    info!("Watching mailbox for bank notifications...");

    // Main message loop
    loop {
        tokio::select! {
            Some(message) = stream.next() => {
                if let Err(e) = handle_message(&message, &mailbox, &store, &matcher, &coordinator).await {
                    error!("Failed to handle message {}: {}", message.uid, e);
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    sweeper.abort();
    drop(coordinator);
    drop(events_tx);
    let _ = notifier_handle.await;
    info!("Shutting down...");
    Ok(())
}

/// Handle one mailbox message end to end: parse, record, match, execute.
///
/// The message itself is consumed exactly once whatever happens next;
/// unparseable mail is marked seen without action, never retried forever.
async fn handle_message(
    message: &MailMessage,
    mailbox: &MailboxClient,
    store: &Arc<Store>,
    matcher: &Matcher,
    coordinator: &Arc<Coordinator>,
) -> AppResult<()> {
    let hint = bank_notify::bank_hint(&message.from);
    let Some(parsed) = bank_notify::parse(&message.body, hint) else {
        warn!(
            "Unrecognized notification {} from {}, marked seen",
            message.uid, message.from
        );
        mailbox.mark_seen(&message.uid).await?;
        return Ok(());
    };

    // Settlement time from the bank when present, arrival time otherwise.
    let occurred_at = parsed
        .occurred_at
        .map(|t| Utc.from_utc_datetime(&t))
        .unwrap_or(message.received_at);

    let inserted = store
        .insert_payment(parsed.amount, parsed.bank, occurred_at, &message.body)
        .await?;
    mailbox.mark_seen(&message.uid).await?;

    let Some(payment) = inserted else {
        debug!("Duplicate notification {} ignored", message.uid);
        return Ok(());
    };
    info!(
        "Recorded payment {} of {} from {} (settled {})",
        payment.id, payment.amount, payment.bank, payment.occurred_at
    );

    match matcher.match_payment(payment.id).await? {
        Some(request_id) => {
            let outcome = coordinator
                .execute_deposit(request_id, payment.id, AUTO_OPERATOR)
                .await?;
            info!("Request {} outcome: {:?}", request_id, outcome);
        }
        None => {
            info!(
                "No matching request for payment {}, left for manual review",
                payment.id
            );
        }
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
