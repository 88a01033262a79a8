//! Rate-limit retry policy.

use crate::error::GatewayError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded retry applied by the facade to rate-limited responses only.
///
/// Anything other than [`GatewayError::RateLimited`] returns on the first
/// attempt: retrying a rejected or ambiguous deposit risks double-crediting.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    pub(crate) async fn run<T, F, Fut>(&self, op: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut last_message = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!("Rate limited, attempt {} after {:?}", attempt, backoff);
                sleep(backoff).await;
                backoff = (backoff * 2).min(self.max_backoff);
            }

            match op().await {
                Err(GatewayError::RateLimited { message }) => {
                    warn!("Platform rate limited (attempt {}): {}", attempt, message);
                    last_message = message;
                }
                other => return other,
            }
        }

        Err(GatewayError::RateLimited {
            message: last_message,
        })
    }
}
