//! Application configuration loaded from environment variables.

use anyhow::{Context, Result};
use platform_gateway::{GatewayCredentials, RetryPolicy};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Mailbox relay configuration
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Payment-to-request matching bounds
    #[serde(default)]
    pub matching: MatchingConfig,

    /// State snapshot location
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway timeouts, retry policy, and per-platform credentials
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Stale-request sweep configuration
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Post-commit notification configuration
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    /// Mailbox relay REST endpoint
    #[serde(default = "default_mailbox_service")]
    pub service_url: String,

    /// Bearer token for the relay, if it requires one
    #[serde(default)]
    pub api_token: Option<SecretString>,

    /// Poll interval for unseen messages
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// How far back a request may have been created and still be matched
    #[serde(default = "default_lookback_window", with = "humantime_serde")]
    pub lookback_window: Duration,

    /// Maximum allowed gap between request creation and payment settlement
    #[serde(default = "default_max_lag", with = "humantime_serde")]
    pub max_lag: Duration,

    /// Money-precision tolerance for amount equality
    #[serde(default = "default_amount_epsilon")]
    pub amount_epsilon: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// State snapshot path
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Rate-limit retry policy shared by all adapters
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-platform credential sections
    #[serde(default)]
    pub credentials: GatewayCredentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    /// Interval between sweep cycles
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Age after which an unmatched pending deposit is failed
    #[serde(default = "default_pending_ttl", with = "humantime_serde")]
    pub pending_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    /// Operator webhook for settled/failed events, if any
    #[serde(default)]
    pub webhook_url: Option<String>,
}

// Default implementations
impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            service_url: default_mailbox_service(),
            api_token: None,
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            lookback_window: default_lookback_window(),
            max_lag: default_max_lag(),
            amount_epsilon: default_amount_epsilon(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            retry: RetryPolicy::default(),
            credentials: GatewayCredentials::default(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: default_sweep_interval(),
            pending_ttl: default_pending_ttl(),
        }
    }
}

// Default value functions
fn default_mailbox_service() -> String {
    "http://mailbox-relay:8080".into()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_lookback_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_max_lag() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_amount_epsilon() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("/data/reconciler-state.json")
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_pending_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    // Account refs and desk ids must stay strings even when
                    // they look numeric.
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
