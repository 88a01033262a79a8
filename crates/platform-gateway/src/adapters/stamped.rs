//! Timestamp-signed session API adapter.
//!
//! Every call carries `sha256(api_key ++ url_path ++ body ++ timestamp)`
//! in `X-Sign`, with the UTC timestamp echoed in `X-Sign-Time`. The
//! timestamp is minted immediately before sending (a reused one invalidates
//! the signature), and the body is serialized to a string exactly once so
//! the signed bytes and the transmitted bytes cannot diverge.

use super::{amount_literal, drain, is_rate_limit_message, PlatformAdapter};
use crate::credentials::StampedCredentials;
use crate::error::GatewayError;
use crate::types::{DepositReceipt, WithdrawReceipt};
use async_trait::async_trait;
use chrono::Utc;
use payment_store::PlatformId;
use reqwest::header::CONTENT_TYPE;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

const DEPOSIT_PATH: &str = "/v1/balance/deposit";
const PAYOUT_PATH: &str = "/v1/payout/confirm";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub struct StampedAdapter {
    creds: StampedCredentials,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct DepositBody<'a> {
    account: &'a str,
    amount: &'a str,
}

#[derive(Debug, Serialize)]
struct PayoutBody<'a> {
    account: &'a str,
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct StampedResponse {
    #[serde(alias = "Success", alias = "ok", default)]
    success: bool,
    #[serde(alias = "Amount", alias = "value", default)]
    amount: Option<Decimal>,
    #[serde(alias = "Message", alias = "error", default)]
    message: Option<String>,
}

impl StampedAdapter {
    pub fn new(creds: StampedCredentials, client: reqwest::Client) -> Self {
        Self { creds, client }
    }

    fn signature(&self, path: &str, body: &str, timestamp: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.creds.api_key.expose_secret().as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(body.as_bytes());
        hasher.update(timestamp.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<StampedResponse, GatewayError> {
        // Serialize once; these exact bytes are signed and transmitted.
        let body = serde_json::to_string(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("request encoding: {e}")))?;
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let signature = self.signature(path, &body, &timestamp);

        let url = format!("{}{}", self.creds.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(url)
            .header("X-Sign", signature)
            .header("X-Sign-Time", timestamp)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let (status, text) = drain(response).await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                message: format!("http {}: {}", status.as_u16(), text),
            });
        }

        let parsed: StampedResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(format!("{e}: {text}")))?;
        if !parsed.success {
            let message = parsed.message.unwrap_or_else(|| "declined".to_string());
            if is_rate_limit_message(&message) {
                return Err(GatewayError::RateLimited { message });
            }
            return Err(GatewayError::Rejected { message });
        }
        Ok(parsed)
    }
}

#[async_trait]
impl PlatformAdapter for StampedAdapter {
    fn platform(&self) -> PlatformId {
        PlatformId::Astra
    }

    #[instrument(skip(self))]
    async fn deposit(
        &self,
        account_ref: &str,
        amount: Decimal,
    ) -> Result<DepositReceipt, GatewayError> {
        let literal = amount_literal(amount);
        let body = DepositBody {
            account: account_ref,
            amount: &literal,
        };
        let response = self.post(DEPOSIT_PATH, &body).await?;
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
            account: account_ref,
            code,
        };
        let response = self.post(PAYOUT_PATH, &body).await?;
        let amount = response.amount.ok_or_else(|| {
            GatewayError::InvalidResponse("payout response carries no amount".into())
        })?;
        Ok(WithdrawReceipt {
            amount,
            message: response.message,
        })
    }
}
