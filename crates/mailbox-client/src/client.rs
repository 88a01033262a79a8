//! Mailbox relay HTTP client.

use crate::error::MailboxError;
use crate::types::MailMessage;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// REST client for the mailbox relay.
#[derive(Clone)]
pub struct MailboxClient {
    client: Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl MailboxClient {
    /// Create a new mailbox client with bounded timeouts.
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<SecretString>,
    ) -> Result<Self, MailboxError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_token,
        })
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Check if the relay is reachable.
    pub async fn health_check(&self) -> bool {
        self.get(format!("{}/v1/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Fetch messages not yet marked seen.
    #[instrument(skip(self))]
    pub async fn fetch_unseen(&self) -> Result<Vec<MailMessage>, MailboxError> {
        let response = self
            .get(format!("{}/v1/messages/unseen", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let msg = response.text().await.unwrap_or_default();
            return Err(MailboxError::Api(msg));
        }

        let messages: Vec<MailMessage> = response.json().await?;
        debug!("Fetched {} unseen messages", messages.len());
        Ok(messages)
    }

    /// Mark a message consumed so the relay never redelivers it.
    #[instrument(skip(self))]
    pub async fn mark_seen(&self, uid: &str) -> Result<(), MailboxError> {
        let response = self
            .post(format!("{}/v1/messages/{}/seen", self.base_url, uid))
            .send()
            .await?;

        if !response.status().is_success() {
            let msg = response.text().await.unwrap_or_default();
            warn!("Mark-seen failed for {}: {}", uid, msg);
            return Err(MailboxError::Api(msg));
        }

        debug!("Marked {} seen", uid);
        Ok(())
    }
}
