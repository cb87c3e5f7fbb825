use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Promotion code defined and validated by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPromotion {
    /// Provider identifier handed back when creating the checkout session.
    pub id: String,
    pub code: String,
}

/// Looks up promotion codes that the payment provider currently considers active.
///
/// Implementations query the provider for at most one active code matching
/// `code` and return the first result. Transport or provider failures are
/// errors; an unknown or inactive code is `Ok(None)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromotionLookup: Send + Sync {
    async fn find_active_promotion(
        &self,
        code: &str,
    ) -> Result<Option<ExternalPromotion>, ServiceError>;
}
