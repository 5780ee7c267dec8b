use smsr_engine::traits::{GatewayError, ProviderError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    /// The request never got an HTTP answer: connection refused, timeout, TLS failure.
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Invalid currency amount: {0}")]
    InvalidCurrencyAmount(String),
}

impl ClientError {
    /// Whether the remote end is down or overloaded, as opposed to having rejected the request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ClientError::RestResponseError(_) => true,
            ClientError::QueryError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Gateways disagree on how to say "no such payment". Some use a 404, others a 400 with a message.
    pub fn is_not_found(&self) -> bool {
        match self {
            ClientError::QueryError { status: 404, .. } => true,
            ClientError::QueryError { status: 400, message } => {
                let message = message.to_ascii_lowercase();
                message.contains("not found") || message.contains("no transaction")
            },
            _ => false,
        }
    }
}

impl From<ClientError> for GatewayError {
    fn from(e: ClientError) -> Self {
        match e {
            e if e.is_unavailable() => GatewayError::GatewayUnavailable(e.to_string()),
            ClientError::Initialization(s) => GatewayError::NotConfigured(s),
            ClientError::JsonError(s) | ClientError::InvalidCurrencyAmount(s) => GatewayError::InvalidResponse(s),
            e => GatewayError::Rejected(e.to_string()),
        }
    }
}

impl From<ClientError> for ProviderError {
    fn from(e: ClientError) -> Self {
        match e {
            e if e.is_unavailable() => ProviderError::Unavailable(e.to_string()),
            ClientError::QueryError { status: 404, message } => ProviderError::NotFound(message),
            ClientError::JsonError(s) | ClientError::InvalidCurrencyAmount(s) => ProviderError::InvalidResponse(s),
            e => ProviderError::Rejected(e.to_string()),
        }
    }
}
