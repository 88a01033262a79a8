//! Routing facade over the platform adapters.

use crate::adapters::{
    CashdeskAdapter, KeyedAdapter, PlatformAdapter, SessionAdapter, StampedAdapter,
};
use crate::credentials::GatewayCredentials;
use crate::error::GatewayError;
use crate::retry::RetryPolicy;
use crate::types::{DepositReceipt, WithdrawReceipt};
use payment_store::PlatformId;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Routes calls to the adapter for a platform and applies the shared
/// rate-limit retry policy. Unconfigured platforms fail immediately with
/// [`GatewayError::Config`]; no adapter failure escapes as anything but a
/// structured [`GatewayError`].
pub struct GatewayFacade {
    adapters: HashMap<PlatformId, Arc<dyn PlatformAdapter>>,
    retry: RetryPolicy,
}

impl GatewayFacade {
    /// Build adapters for every platform with configured credentials.
    pub fn from_credentials(
        creds: GatewayCredentials,
        retry: RetryPolicy,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {e}")))?;

        let mut adapters: HashMap<PlatformId, Arc<dyn PlatformAdapter>> = HashMap::new();

        let cashdesk = [
            (PlatformId::Orion, creds.orion),
            (PlatformId::Lunar, creds.lunar),
            (PlatformId::Major, creds.major),
            (PlatformId::Prime, creds.prime),
        ];
        for (platform, section) in cashdesk {
            if let Some(section) = section {
                adapters.insert(
                    platform,
                    Arc::new(CashdeskAdapter::new(platform, section, client.clone())?),
                );
            }
        }
        if let Some(section) = creds.astra {
            adapters.insert(
                PlatformId::Astra,
                Arc::new(StampedAdapter::new(section, client.clone())),
            );
        }
        if let Some(section) = creds.nova {
            adapters.insert(
                PlatformId::Nova,
                Arc::new(KeyedAdapter::new(section, client.clone())),
            );
        }
        if let Some(section) = creds.royal {
            adapters.insert(
                PlatformId::Royal,
                Arc::new(SessionAdapter::new(section, client)),
            );
        }

        info!("Gateway facade ready for {} platforms", adapters.len());
        Ok(Self { adapters, retry })
    }

    /// Assemble from prebuilt adapters; used by tests and embedding code.
    pub fn from_adapters(adapters: Vec<Arc<dyn PlatformAdapter>>, retry: RetryPolicy) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.platform(), adapter))
            .collect();
        Self { adapters, retry }
    }

    pub fn configured_platforms(&self) -> Vec<PlatformId> {
        let mut platforms: Vec<_> = self.adapters.keys().copied().collect();
        platforms.sort_by_key(|p| format!("{p}"));
        platforms
    }

    fn adapter(&self, platform: PlatformId) -> Result<&Arc<dyn PlatformAdapter>, GatewayError> {
        self.adapters
            .get(&platform)
            .ok_or_else(|| GatewayError::Config(format!("no credentials configured for {platform}")))
    }

    /// Credit a platform account. Retries only rate-limited responses.
    pub async fn deposit(
        &self,
        platform: PlatformId,
        account_ref: &str,
        amount: Decimal,
    ) -> Result<DepositReceipt, GatewayError> {
        let adapter = self.adapter(platform)?;
        self.retry
            .run(|| adapter.deposit(account_ref, amount))
            .await
    }

    /// Submit a withdrawal confirmation code. For these platforms the
    /// verification is the execution.
    pub async fn verify_and_execute(
        &self,
        platform: PlatformId,
        account_ref: &str,
        code: &str,
    ) -> Result<WithdrawReceipt, GatewayError> {
        let adapter = self.adapter(platform)?;
        self.retry
            .run(|| adapter.verify_and_execute(account_ref, code))
            .await
    }
}
