/// Failure categories of the exchange boundary.
///
/// `Network`, `RateLimited` and retryable `Trading` errors are transient and
/// may be retried locally; everything else is terminal for the operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("account error: {0}")]
    Account(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("trading error: {message}")]
    Trading { message: String, retryable: bool },

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("signing error: {0}")]
    Signing(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network(_) | GatewayError::RateLimited(_) => true,
            GatewayError::Trading { retryable, .. } => *retryable,
            GatewayError::Account(_)
            | GatewayError::WebSocket(_)
            | GatewayError::UnknownAsset(_)
            | GatewayError::Signing(_) => false,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        GatewayError::Trading {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        GatewayError::Trading {
            message: message.into(),
            retryable: true,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            GatewayError::RateLimited(e.to_string())
        } else if e.is_decode() {
            GatewayError::Account(format!("malformed response: {e}"))
        } else {
            GatewayError::Network(e.to_string())
        }
    }
}
