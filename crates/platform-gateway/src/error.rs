//! Gateway error taxonomy.

use thiserror::Error;

/// Normalized gateway failure.
///
/// `Unknown` means the call produced no definitive response (timeout,
/// connection loss mid-flight): the remote outcome is undecided and the
/// caller must not blindly retry a deposit on it.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing or invalid credentials. Surfaced immediately, never retried.
    #[error("platform not configured: {0}")]
    Config(String),

    /// The platform explicitly declined the operation.
    #[error("platform rejected: {message}")]
    Rejected { message: String },

    /// HTTP 429 or a platform-specific rate-limit response. The only
    /// variant the facade's retry policy acts on.
    #[error("platform rate limited: {message}")]
    RateLimited { message: String },

    /// Timeout or transport failure with no definitive response.
    #[error("no definitive response: {0}")]
    Unknown(String),

    /// The platform answered with a shape we cannot interpret.
    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Classify a transport error. Timeouts and connection drops are
    /// ambiguous outcomes, not rejections.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Unknown(err.to_string())
        }
    }
}
