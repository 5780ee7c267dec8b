use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::*;
use smsr_common::MicroUsd;
use smsr_engine::{
    traits::{AccountApiError, ExchangeRateError, GatewayError, LedgerError},
    DepositError,
    PurchaseError,
    ReconciliationError,
};
use thiserror::Error;

/// Everything a request handler can fail with.
///
/// The `Display` text is for the logs and may contain upstream detail. Clients only ever see
/// [`ServerError::user_message`], which is one of a fixed set of explanations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The webhook signature is missing or invalid")]
    InvalidSignature,
    #[error("No payment gateway named {0} is configured")]
    UnknownGateway(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("No wallet exists for {0}")]
    AccountNotFound(String),
    #[error("Insufficient balance. {shortfall} more is needed")]
    InsufficientFunds { shortfall: MicroUsd },
    #[error("The payment gateway is unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("Number provisioning failed. {0}")]
    ProvisioningUnavailable(String),
}

impl ServerError {
    /// The fixed, human-readable explanation returned to the client.
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientFunds { shortfall } => format!("Insufficient balance. You need {shortfall} more."),
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) => "Invalid request.".into(),
            Self::InvalidSignature => "Invalid signature.".into(),
            Self::AuthenticationError(AuthError::InsufficientPermissions(_)) => "Forbidden.".into(),
            Self::AuthenticationError(_) => "Unauthorized.".into(),
            Self::UnknownGateway(_) | Self::NoRecordFound(_) => "Reference not found.".into(),
            Self::AccountNotFound(_) => "Account not found.".into(),
            Self::GatewayUnavailable(_) => "Payment gateway is currently unavailable.".into(),
            Self::ProvisioningUnavailable(_) => "Number provisioning is currently unavailable.".into(),
            Self::InitializeError(_) | Self::BackendError(_) | Self::IOError(_) | Self::ConfigurationError(_) => {
                "Internal server error.".into()
            },
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedToken(_) => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            },
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::UnknownGateway(_) => StatusCode::NOT_FOUND,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::AccountNotFound(_) => StatusCode::NOT_FOUND,
            Self::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProvisioningUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ {self}");
        } else {
            debug!("💻️ {self}");
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.user_message() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No bearer token was provided.")]
    MissingToken,
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Access token could not be validated. {0}")]
    ValidationError(String),
    #[error("Access token has expired.")]
    TokenExpired,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
}

impl From<AccountApiError> for ServerError {
    fn from(e: AccountApiError) -> Self {
        match e {
            AccountApiError::QueryError(s) => Self::InvalidRequestBody(s),
            AccountApiError::DatabaseError(s) => Self::BackendError(format!("Database error: {s}")),
        }
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AccountError(e) => e.into(),
            LedgerError::WalletNotFound(owner) => Self::AccountNotFound(owner),
            LedgerError::InsufficientFunds { balance, required } => {
                Self::InsufficientFunds { shortfall: required - balance }
            },
            LedgerError::TransactionNotFound(s) => Self::NoRecordFound(s),
            LedgerError::ResourceNotFound(id) => Self::NoRecordFound(format!("resource {id}")),
            LedgerError::UnattributedPaymentNotFound(id) => Self::NoRecordFound(format!("unattributed payment {id}")),
            LedgerError::InvalidStateTransition(s) => Self::InvalidRequestBody(s),
            e => Self::BackendError(e.to_string()),
        }
    }
}

impl From<ExchangeRateError> for ServerError {
    fn from(e: ExchangeRateError) -> Self {
        match e {
            ExchangeRateError::RateDoesNotExist(c) => Self::NoRecordFound(format!("exchange rate for {c}")),
            ExchangeRateError::InvalidRate(_) => Self::InvalidRequestBody(e.to_string()),
            ExchangeRateError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<ReconciliationError> for ServerError {
    fn from(e: ReconciliationError) -> Self {
        match e {
            ReconciliationError::GatewayUnavailable(s) => Self::GatewayUnavailable(s),
            // Redelivery is the only remedy for an unreadable ground-truth response
            ReconciliationError::InvalidGatewayResponse(s) => Self::GatewayUnavailable(s),
            ReconciliationError::ReferenceNotFound(r) => Self::NoRecordFound(r),
            ReconciliationError::Ledger(e) => e.into(),
            ReconciliationError::Account(e) => e.into(),
            e @ ReconciliationError::OwnerResolutionFailed { .. } => Self::BackendError(e.to_string()),
            e @ ReconciliationError::ConversionFailed { .. } => Self::BackendError(e.to_string()),
        }
    }
}

impl From<GatewayError> for ServerError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::ReferenceNotFound(r) => Self::NoRecordFound(r),
            GatewayError::NotConfigured(s) => Self::ConfigurationError(s),
            e => Self::GatewayUnavailable(e.to_string()),
        }
    }
}

impl From<DepositError> for ServerError {
    fn from(e: DepositError) -> Self {
        match e {
            DepositError::AmountTooSmall { .. } | DepositError::UnsupportedCurrency(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            DepositError::AmountRequired(_) => Self::InvalidRequestBody(e.to_string()),
            DepositError::WalletNotFound(owner) => Self::AccountNotFound(owner),
            DepositError::ExchangeRate(e) => e.into(),
            DepositError::Gateway(e) => e.into(),
            DepositError::Ledger(e) => e.into(),
            DepositError::Account(e) => e.into(),
        }
    }
}

impl From<PurchaseError> for ServerError {
    fn from(e: PurchaseError) -> Self {
        match e {
            PurchaseError::InsufficientFunds { shortfall, .. } => Self::InsufficientFunds { shortfall },
            PurchaseError::ProvisioningFailed(e) => Self::ProvisioningUnavailable(e.to_string()),
            PurchaseError::Upstream(e) => Self::ProvisioningUnavailable(e.to_string()),
            PurchaseError::WalletNotFound(owner) => Self::AccountNotFound(owner),
            PurchaseError::ResourceNotFound(id) => Self::NoRecordFound(format!("resource {id}")),
            PurchaseError::NotCancellable(s) => Self::InvalidRequestBody(s),
            PurchaseError::Ledger(e) => e.into(),
            PurchaseError::Account(e) => e.into(),
        }
    }
}
