use http::StatusCode;
use sea_orm::error::DbErr;
use strum::{AsRefStr, Display};

/// Generic message shown to payers for every rejected code, whatever the cause.
pub const INVALID_PROMO_CODE_MESSAGE: &str = "Invalid or expired promo code";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{}", INVALID_PROMO_CODE_MESSAGE)]
    InvalidPromoCode,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Convenience constructor for wrapping string-based database errors.
    pub fn database_error_message(message: impl Into<String>) -> Self {
        ServiceError::DatabaseError(DbErr::Custom(message.into()))
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidInput(_) | Self::InvalidPromoCode => {
                StatusCode::BAD_REQUEST
            }
            Self::InternalError(_) | Self::SerializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ExternalServiceError(_) | Self::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::ExternalServiceError(_) | Self::ExternalApiError(_) => {
                "Payment provider error".to_string()
            }
            Self::ServiceUnavailable(_) => "Service temporarily unavailable".to_string(),
            _ => self.to_string(),
        }
    }

    /// True for infrastructure failures a caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_)
                | Self::ExternalServiceError(_)
                | Self::ExternalApiError(_)
                | Self::ServiceUnavailable(_)
        )
    }
}

/// Why a discount code was refused.
///
/// Reasons are kept for logs and metrics only. Payers always get
/// [`INVALID_PROMO_CODE_MESSAGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RejectionReason {
    Inactive,
    BeforeWindow,
    AfterWindow,
    UsageExhausted,
    InvalidDiscountValue,
    InvalidComputedAmount,
    DiscountExceedsPrice,
    NotFoundExternally,
}

/// Terminal failure of a single price composition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutRejection {
    #[error("Invalid promo code ({})", join_reasons(.0))]
    InvalidPromoCode(Vec<RejectionReason>),

    #[error("Promotion lookup unavailable: {0}")]
    LookupUnavailable(String),

    #[error("Invalid base price: {0}")]
    InvalidBasePrice(i64),
}

impl CheckoutRejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPromoCode(_) => StatusCode::BAD_REQUEST,
            Self::LookupUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidBasePrice(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the payer. Never includes rejection reasons.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidPromoCode(_) => INVALID_PROMO_CODE_MESSAGE,
            Self::LookupUnavailable(_) => {
                "Promo code validation is temporarily unavailable, please try again"
            }
            Self::InvalidBasePrice(_) => "Internal server error",
        }
    }

    pub fn reasons(&self) -> &[RejectionReason] {
        match self {
            Self::InvalidPromoCode(reasons) => reasons,
            _ => &[],
        }
    }
}

impl From<CheckoutRejection> for ServiceError {
    fn from(rejection: CheckoutRejection) -> Self {
        match rejection {
            CheckoutRejection::InvalidPromoCode(_) => ServiceError::InvalidPromoCode,
            CheckoutRejection::LookupUnavailable(msg) => ServiceError::ServiceUnavailable(msg),
            CheckoutRejection::InvalidBasePrice(price) => {
                ServiceError::InternalError(format!("plan price must be positive, got {}", price))
            }
        }
    }
}

fn join_reasons(reasons: &[RejectionReason]) -> String {
    reasons
        .iter()
        .map(|r| r.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}
