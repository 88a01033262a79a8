//! Session-login adapter.
//!
//! A login call yields a bearer token and session id, cached until the
//! configured TTL lapses. The cache sits behind one mutex, so concurrent
//! callers single-flight through a refresh instead of stampeding the login
//! endpoint. A 401 invalidates the cache and triggers exactly one
//! re-login-and-retry, never a loop.

use super::{amount_literal, drain, is_rate_limit_message, PlatformAdapter};
use crate::credentials::SessionCredentials;
use crate::error::GatewayError;
use crate::types::{DepositReceipt, WithdrawReceipt};
use async_trait::async_trait;
use payment_store::PlatformId;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub struct SessionAdapter {
    creds: SessionCredentials,
    client: reqwest::Client,
    session: Mutex<Option<CachedSession>>,
}

#[derive(Clone)]
struct CachedSession {
    token: String,
    session_id: String,
    expires_at: Instant,
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(alias = "sessionId")]
    session_id: String,
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
struct SessionResponse {
    #[serde(alias = "Success", default)]
    success: bool,
    #[serde(alias = "Amount", default)]
    amount: Option<Decimal>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

enum SendFailure {
    /// The platform no longer accepts the session token.
    Unauthorized,
    Gateway(GatewayError),
}

impl SessionAdapter {
    pub fn new(creds: SessionCredentials, client: reqwest::Client) -> Self {
        Self {
            creds,
            client,
            session: Mutex::new(None),
        }
    }

    async fn login(&self) -> Result<CachedSession, GatewayError> {
        let url = format!("{}/auth/login", self.creds.base_url.trim_end_matches('/'));
        let body = LoginBody {
            username: &self.creds.username,
            password: self.creds.password.expose_secret(),
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;
        let (status, text) = drain(response).await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Config(format!(
                "login rejected for {}",
                self.creds.username
            )));
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                message: format!("login failed: http {}", status.as_u16()),
            });
        }

        let login: LoginResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(format!("login response: {e}")))?;
        info!("Logged in to royal as {}", self.creds.username);

        Ok(CachedSession {
            token: login.token,
            session_id: login.session_id,
            expires_at: Instant::now() + self.creds.session_ttl,
        })
    }

    /// Get a usable session, logging in when the cache is empty or stale.
    async fn current_session(&self) -> Result<CachedSession, GatewayError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.expires_at > Instant::now() {
                return Ok(session.clone());
            }
            debug!("Cached session expired, re-logging in");
        }
        let session = self.login().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Replace a session the platform just refused. If another caller
    /// already re-logged in while we waited on the lock, reuse theirs.
    async fn refreshed_session(&self, stale_token: &str) -> Result<CachedSession, GatewayError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.token != stale_token && session.expires_at > Instant::now() {
                return Ok(session.clone());
            }
        }
        let session = self.login().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn send<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        session: &CachedSession,
    ) -> Result<SessionResponse, SendFailure> {
        let url = format!("{}{}", self.creds.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(url)
            .bearer_auth(&session.token)
            .header("X-Session-Id", &session.session_id)
            .json(body)
            .send()
            .await
            .map_err(|e| SendFailure::Gateway(GatewayError::from_transport(e)))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(SendFailure::Unauthorized);
        }

        let (status, text) = drain(response).await.map_err(SendFailure::Gateway)?;
        if !status.is_success() {
            return Err(SendFailure::Gateway(GatewayError::Rejected {
                message: format!("http {}: {}", status.as_u16(), text),
            }));
        }

        let parsed: SessionResponse = serde_json::from_str(&text)
            .map_err(|e| SendFailure::Gateway(GatewayError::InvalidResponse(format!("{e}: {text}"))))?;
        if !parsed.success {
            let message = parsed.message.unwrap_or_else(|| "declined".to_string());
            if is_rate_limit_message(&message) {
                return Err(SendFailure::Gateway(GatewayError::RateLimited { message }));
            }
            return Err(SendFailure::Gateway(GatewayError::Rejected { message }));
        }
        Ok(parsed)
    }

    async fn call<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<SessionResponse, GatewayError> {
        let session = self.current_session().await?;
        match self.send(path, body, &session).await {
            Ok(response) => Ok(response),
            Err(SendFailure::Gateway(err)) => Err(err),
            Err(SendFailure::Unauthorized) => {
                warn!("Session token refused, re-logging in once");
                let fresh = self.refreshed_session(&session.token).await?;
                match self.send(path, body, &fresh).await {
                    Ok(response) => Ok(response),
                    Err(SendFailure::Gateway(err)) => Err(err),
                    Err(SendFailure::Unauthorized) => Err(GatewayError::Rejected {
                        message: "session refused after re-login".into(),
                    }),
                }
            }
        }
    }
}

#[async_trait]
impl PlatformAdapter for SessionAdapter {
    fn platform(&self) -> PlatformId {
        PlatformId::Royal
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
        let response = self.call("/cash/deposit", &body).await?;
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
        let response = self.call("/cash/payout", &body).await?;
        let amount = response.amount.ok_or_else(|| {
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
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: &str) -> SessionAdapter {
        SessionAdapter::new(
            SessionCredentials {
                base_url: base_url.to_string(),
                username: "desk-7".into(),
                password: "hunter2".to_string().into(),
                session_ttl: Duration::from_secs(600),
            },
            reqwest::Client::new(),
        )
    }

    fn login_mock(token: &str) -> Mock {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": token,
                "sessionId": "sess-1"
            })))
    }

    #[tokio::test]
    async fn session_is_cached_across_calls() {
        let server = MockServer::start().await;
        login_mock("tok-1").expect(1).mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/cash/deposit"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "amount": "10"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        adapter.deposit("p9", dec!(10)).await.unwrap();
        adapter.deposit("p9", dec!(10)).await.unwrap();
    }

    #[tokio::test]
    async fn a_401_triggers_exactly_one_relogin() {
        let server = MockServer::start().await;
        // Two logins total: the initial one and the single refresh.
        login_mock("tok-1").expect(2).mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/cash/deposit"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let err = adapter(&server.uri()).deposit("p9", dec!(10)).await.unwrap_err();
        match err {
            GatewayError::Rejected { message } => {
                assert!(message.contains("after re-login"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_on_the_retried_call() {
        let server = MockServer::start().await;
        login_mock("tok-1").mount(&server).await;

        // First deposit call is refused, the retry succeeds.
        Mock::given(method("POST"))
            .and(path("/cash/deposit"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cash/deposit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "amount": "10"
            })))
            .mount(&server)
            .await;

        let receipt = adapter(&server.uri()).deposit("p9", dec!(10)).await.unwrap();
        assert_eq!(receipt.credited_amount, dec!(10));
    }

    #[tokio::test]
    async fn rejected_login_is_a_config_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = adapter(&server.uri()).deposit("p9", dec!(10)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
