//! Shared API-key header adapter.
//!
//! The simplest protocol shape and the default for newly integrated
//! platforms: a shared secret in `X-Api-Key` plus numeric project
//! identifiers in the body.

use super::{amount_literal, drain, is_rate_limit_message, PlatformAdapter};
use crate::credentials::KeyedCredentials;
use crate::error::GatewayError;
use crate::types::{DepositReceipt, WithdrawReceipt};
use async_trait::async_trait;
use payment_store::PlatformId;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub struct KeyedAdapter {
    creds: KeyedCredentials,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct DepositBody<'a> {
    project_id: u64,
    account: &'a str,
    amount: &'a str,
}

#[derive(Debug, Serialize)]
struct PayoutBody<'a> {
    project_id: u64,
    account: &'a str,
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct KeyedResponse {
    #[serde(alias = "Status")]
    status: String,
    #[serde(alias = "Amount", default)]
    amount: Option<Decimal>,
    #[serde(alias = "Message", alias = "detail", default)]
    message: Option<String>,
}

impl KeyedAdapter {
    pub fn new(creds: KeyedCredentials, client: reqwest::Client) -> Self {
        Self { creds, client }
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<KeyedResponse, GatewayError> {
        let url = format!("{}{}", self.creds.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(url)
            .header("X-Api-Key", self.creds.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let (status, text) = drain(response).await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                message: format!("http {}: {}", status.as_u16(), text),
            });
        }

        let parsed: KeyedResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(format!("{e}: {text}")))?;
        if !parsed.status.eq_ignore_ascii_case("ok") {
            let message = parsed
                .message
                .unwrap_or_else(|| format!("status {}", parsed.status));
            if is_rate_limit_message(&message) {
                return Err(GatewayError::RateLimited { message });
            }
            return Err(GatewayError::Rejected { message });
        }
        Ok(parsed)
    }
}

#[async_trait]
impl PlatformAdapter for KeyedAdapter {
    fn platform(&self) -> PlatformId {
        PlatformId::Nova
    }

    #[instrument(skip(self))]
    async fn deposit(
        &self,
        account_ref: &str,
        amount: Decimal,
    ) -> Result<DepositReceipt, GatewayError> {
        let literal = amount_literal(amount);
        let body = DepositBody {
            project_id: self.creds.project_id,
            account: account_ref,
            amount: &literal,
        };
        let response = self.post("/api/v2/deposit", &body).await?;
        Ok(DepositReceipt {
            credited_amount: response.amount.unwrap_or(amount),
            message: response.message,
        })
    }

    #[instrument(skip(self, code))]
    async fn verify_and_execute(
        &self,
        account_ref: &str,
        code: &str,
    ) -> Result<WithdrawReceipt, GatewayError> {
        let body = PayoutBody {
            project_id: self.creds.project_id,
            account: account_ref,
            code,
        };
        let response = self.post("/api/v2/payout", &body).await?;
        let amount = response.amount.ok_or_else(|| {
            GatewayError::InvalidResponse("payout response carries no amount".into())
        })?;
        Ok(WithdrawReceipt {
            amount,
            message: response.message,
        })
    }
}
