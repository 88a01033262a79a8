//! Cashdesk-family adapter: shared-secret dual-hash signing.
//!
//! Four platforms share this wire protocol. The confirmation token is
//! `md5(account ":" shared_hash)`; the per-call signature is an outer
//! sha256 over two inner md5 digests rendered as lowercase hex:
//!
//! ```text
//! sign = sha256( md5("hash={h}&lng=ru&userid={account}")
//!             ++ md5("summa={amount}&cashierpass={pass}&cashdeskid={id}") )
//! ```
//!
//! Orion and Major also send HTTP basic auth, Lunar and Prime lowercase the
//! account in the confirmation token. Both branches key on the platform
//! itself, not on configuration.

use super::{amount_literal, drain, is_rate_limit_message, PlatformAdapter};
use crate::credentials::CashdeskCredentials;
use crate::error::GatewayError;
use crate::types::{DepositReceipt, WithdrawReceipt};
use async_trait::async_trait;
use payment_store::PlatformId;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

#[derive(Debug)]
pub struct CashdeskAdapter {
    platform: PlatformId,
    creds: CashdeskCredentials,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct DepositBody<'a> {
    #[serde(rename = "cashdeskId")]
    cashdesk_id: &'a str,
    lng: &'static str,
    summa: &'a str,
    confirm: &'a str,
}

#[derive(Debug, Serialize)]
struct PayoutBody<'a> {
    #[serde(rename = "cashdeskId")]
    cashdesk_id: &'a str,
    lng: &'static str,
    code: &'a str,
    confirm: &'a str,
}

/// The four platform variants disagree on response field casing; aliases
/// fold them into one shape.
#[derive(Debug, Deserialize)]
struct CashdeskResponse {
    #[serde(alias = "Success", default)]
    success: bool,
    #[serde(alias = "Summa", alias = "Amount", alias = "amount", default)]
    summa: Option<Decimal>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

impl CashdeskAdapter {
    pub fn new(
        platform: PlatformId,
        creds: CashdeskCredentials,
        client: reqwest::Client,
    ) -> Result<Self, GatewayError> {
        if !matches!(
            platform,
            PlatformId::Orion | PlatformId::Lunar | PlatformId::Major | PlatformId::Prime
        ) {
            return Err(GatewayError::Config(format!(
                "{platform} is not a cashdesk platform"
            )));
        }
        if matches!(platform, PlatformId::Orion | PlatformId::Major)
            && (creds.basic_user.is_none() || creds.basic_pass.is_none())
        {
            return Err(GatewayError::Config(format!(
                "{platform} requires a basic-auth pair"
            )));
        }
        Ok(Self {
            platform,
            creds,
            client,
        })
    }

    fn lowercases_account(&self) -> bool {
        matches!(self.platform, PlatformId::Lunar | PlatformId::Prime)
    }

    fn requires_basic_auth(&self) -> bool {
        matches!(self.platform, PlatformId::Orion | PlatformId::Major)
    }

    fn confirm_token(&self, account_ref: &str) -> String {
        let account = if self.lowercases_account() {
            account_ref.to_lowercase()
        } else {
            account_ref.to_string()
        };
        let digest = md5::compute(format!(
            "{}:{}",
            account,
            self.creds.shared_hash.expose_secret()
        ));
        format!("{digest:x}")
    }

    fn sign(&self, account_ref: &str, payload_field: &str, payload_value: &str) -> String {
        let inner_user = md5::compute(format!(
            "hash={}&lng=ru&userid={}",
            self.creds.shared_hash.expose_secret(),
            account_ref
        ));
        let inner_payload = md5::compute(format!(
            "{}={}&cashierpass={}&cashdeskid={}",
            payload_field,
            payload_value,
            self.creds.cashier_pass.expose_secret(),
            self.creds.cashdesk_id
        ));
        let mut outer = Sha256::new();
        outer.update(format!("{inner_user:x}{inner_payload:x}"));
        hex::encode(outer.finalize())
    }

    async fn call<B: Serialize>(
        &self,
        url: String,
        sign: String,
        body: &B,
    ) -> Result<CashdeskResponse, GatewayError> {
        let mut builder = self.client.post(url).header("sign", sign).json(body);
        if self.requires_basic_auth() {
            let user = self
                .creds
                .basic_user
                .as_deref()
                .ok_or_else(|| GatewayError::Config("missing basic-auth user".into()))?;
            let pass = self
                .creds
                .basic_pass
                .as_ref()
                .ok_or_else(|| GatewayError::Config("missing basic-auth password".into()))?;
            builder = builder.basic_auth(user, Some(pass.expose_secret()));
        }

        let response = builder.send().await.map_err(GatewayError::from_transport)?;
        let (status, text) = drain(response).await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                message: format!("http {}: {}", status.as_u16(), text),
            });
        }

        let parsed: CashdeskResponse = serde_json::from_str(&text)
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
impl PlatformAdapter for CashdeskAdapter {
    fn platform(&self) -> PlatformId {
        self.platform
    }

    #[instrument(skip(self), fields(platform = %self.platform))]
    async fn deposit(
        &self,
        account_ref: &str,
        amount: Decimal,
    ) -> Result<DepositReceipt, GatewayError> {
        let summa = amount_literal(amount);
        let confirm = self.confirm_token(account_ref);
        let sign = self.sign(account_ref, "summa", &summa);
        let url = format!(
            "{}/Deposit/{}/Add",
            self.creds.base_url.trim_end_matches('/'),
            account_ref
        );

        let body = DepositBody {
            cashdesk_id: &self.creds.cashdesk_id,
            lng: "ru",
            summa: &summa,
            confirm: &confirm,
        };
        let response = self.call(url, sign, &body).await?;

        debug!("Cashdesk deposit accepted for {}", account_ref);
        Ok(DepositReceipt {
            credited_amount: response.summa.unwrap_or(amount),
            message: response.message,
        })
    }

    #[instrument(skip(self, code), fields(platform = %self.platform))]
    async fn verify_and_execute(
        &self,
        account_ref: &str,
        code: &str,
    ) -> Result<WithdrawReceipt, GatewayError> {
        let confirm = self.confirm_token(account_ref);
        let sign = self.sign(account_ref, "code", code);
        let url = format!(
            "{}/Deposit/{}/Pay",
            self.creds.base_url.trim_end_matches('/'),
            account_ref
        );

        let body = PayoutBody {
            cashdesk_id: &self.creds.cashdesk_id,
            lng: "ru",
            code,
            confirm: &confirm,
        };
        let response = self.call(url, sign, &body).await?;

        let amount = response.summa.ok_or_else(|| {
            GatewayError::InvalidResponse("payout response carries no amount".into())
        })?;
        Ok(WithdrawReceipt {
            amount,
            message: response.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds(base_url: &str, with_basic: bool) -> CashdeskCredentials {
        CashdeskCredentials {
            base_url: base_url.to_string(),
            cashdesk_id: "90021".into(),
            cashier_pass: "cashpass".to_string().into(),
            shared_hash: "sk-shared-hash".to_string().into(),
            basic_user: with_basic.then(|| "desk".to_string()),
            basic_pass: with_basic.then(|| "deskpass".to_string().into()),
        }
    }

    fn adapter(platform: PlatformId, base_url: &str) -> CashdeskAdapter {
        let with_basic = matches!(platform, PlatformId::Orion | PlatformId::Major);
        CashdeskAdapter::new(platform, creds(base_url, with_basic), reqwest::Client::new())
            .unwrap()
    }

    // Reference vectors computed independently from the protocol definition.
    #[test]
    fn confirmation_token_reference_vector() {
        let orion = adapter(PlatformId::Orion, "http://x");
        assert_eq!(
            orion.confirm_token("PLAYER77"),
            "2def1312b05173dbc9dea03a4e204364"
        );
    }

    #[test]
    fn lowercasing_variants_fold_account_case() {
        let lunar = adapter(PlatformId::Lunar, "http://x");
        assert_eq!(
            lunar.confirm_token("PLAYER77"),
            "c46a6801fe710c6adb97f23fd3998d0a"
        );
        assert_eq!(lunar.confirm_token("PLAYER77"), lunar.confirm_token("player77"));

        let orion = adapter(PlatformId::Orion, "http://x");
        assert_ne!(orion.confirm_token("PLAYER77"), orion.confirm_token("player77"));
    }

    #[test]
    fn deposit_signature_reference_vector() {
        let orion = adapter(PlatformId::Orion, "http://x");
        assert_eq!(
            orion.sign("PLAYER77", "summa", "500.5"),
            "8ee40c562e6bdfae4598a0256baf40425b73af2cabff380a71a2d98b4fdb844e"
        );
    }

    #[test]
    fn payout_signature_reference_vector() {
        let orion = adapter(PlatformId::Orion, "http://x");
        assert_eq!(
            orion.sign("PLAYER77", "code", "882211"),
            "f2390c6f328828b1fa9565697fd880f031d3093bfa12e8d90cc77ca545f7e690"
        );
    }

    #[test]
    fn basic_auth_platforms_require_the_pair() {
        let err = CashdeskAdapter::new(
            PlatformId::Major,
            creds("http://x", false),
            reqwest::Client::new(),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        // Lunar does not use basic auth, so no pair is fine.
        CashdeskAdapter::new(
            PlatformId::Lunar,
            creds("http://x", false),
            reqwest::Client::new(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn deposit_sends_signed_request_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Deposit/PLAYER77/Add"))
            .and(header(
                "sign",
                "8ee40c562e6bdfae4598a0256baf40425b73af2cabff380a71a2d98b4fdb844e",
            ))
            .and(header_exists("authorization"))
            .and(body_partial_json(serde_json::json!({
                "cashdeskId": "90021",
                "lng": "ru",
                "summa": "500.5",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Success": true,
                "Summa": 500.5,
                "Message": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(PlatformId::Orion, &server.uri());
        let receipt = adapter.deposit("PLAYER77", dec!(500.50)).await.unwrap();
        assert_eq!(receipt.credited_amount, dec!(500.5));
    }

    #[tokio::test]
    async fn declined_deposit_is_rejected_with_platform_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Success": false,
                "Message": "User not found"
            })))
            .mount(&server)
            .await;

        let adapter = adapter(PlatformId::Prime, &server.uri());
        let err = adapter.deposit("ghost", dec!(10)).await.unwrap_err();
        match err {
            GatewayError::Rejected { message } => assert_eq!(message, "User not found"),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn soft_rate_limit_message_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Success": false,
                "Message": "Too many requests"
            })))
            .mount(&server)
            .await;

        let adapter = adapter(PlatformId::Lunar, &server.uri());
        let err = adapter.deposit("p1", dec!(10)).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn payout_requires_an_amount_in_the_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Deposit/p1/Pay"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Success": true
            })))
            .mount(&server)
            .await;

        let adapter = adapter(PlatformId::Lunar, &server.uri());
        let err = adapter.verify_and_execute("p1", "11223").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }
}
