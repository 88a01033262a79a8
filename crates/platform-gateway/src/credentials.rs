//! Per-platform secret material.
//!
//! Resolved from configuration once at boot. Secret fields are
//! [`SecretString`]s so a stray `{:?}` can never leak them into logs.

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Credential sections for every platform the gateway can reach. A missing
/// section means the platform is not configured; using it is an immediate
/// configuration error.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GatewayCredentials {
    pub orion: Option<CashdeskCredentials>,
    pub lunar: Option<CashdeskCredentials>,
    pub major: Option<CashdeskCredentials>,
    pub prime: Option<CashdeskCredentials>,
    pub astra: Option<StampedCredentials>,
    pub nova: Option<KeyedCredentials>,
    pub royal: Option<SessionCredentials>,
}

/// Cashdesk-family credentials (shared-secret dual-hash signing).
#[derive(Debug, Clone, Deserialize)]
pub struct CashdeskCredentials {
    pub base_url: String,
    pub cashdesk_id: String,
    pub cashier_pass: SecretString,
    pub shared_hash: SecretString,
    /// Basic-auth pair for the platform variants that demand it.
    pub basic_user: Option<String>,
    pub basic_pass: Option<SecretString>,
}

/// Timestamp-signed session API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct StampedCredentials {
    pub base_url: String,
    pub api_key: SecretString,
}

/// Shared API-key header credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyedCredentials {
    pub base_url: String,
    pub api_key: SecretString,
    pub project_id: u64,
}

/// Session-login credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCredentials {
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
    /// How long a cached session stays usable before a fresh login.
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(20 * 60)
}
