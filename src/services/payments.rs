use crate::{
    config::AppConfig,
    errors::ServiceError,
    services::{
        commerce::checkout_service::{CheckoutGateway, CheckoutSession, CheckoutSessionRequest},
        promotions::{ExternalPromotion, PromotionLookup},
    },
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PromotionCodeObject {
    id: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    url: Option<String>,
}

/// Stripe REST client covering promotion code lookup and hosted checkout sessions.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let secret_key = cfg
            .payment_provider_secret_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "payment_provider_secret_key is not configured".to_string(),
                )
            })?;

        Self::new(
            cfg.payment_provider_base_url.as_str(),
            secret_key,
            Duration::from_secs(cfg.payment_provider_timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, operation, "Payment provider returned an error");
            return Err(ServiceError::ExternalApiError(format!(
                "{} failed with status {}: {}",
                operation, status, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::SerializationError(format!("{}: {}", operation, e)))
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
pub fn checkout_session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.to_lowercase(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.unit_amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
    ];

    if let Some(promotion_code) = &request.promotion_code_id {
        form.push((
            "discounts[0][promotion_code]".to_string(),
            promotion_code.clone(),
        ));
    }
    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
    }

    form
}

#[async_trait]
impl PromotionLookup for StripeClient {
    #[instrument(skip(self))]
    async fn find_active_promotion(
        &self,
        code: &str,
    ) -> Result<Option<ExternalPromotion>, ServiceError> {
        let response = self
            .client
            .get(self.endpoint("/v1/promotion_codes"))
            .bearer_auth(&self.secret_key)
            .query(&[("code", code), ("active", "true"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("promotion code lookup failed: {}", e))
            })?;

        let page: ListResponse<PromotionCodeObject> =
            Self::read_json(response, "promotion code lookup").await?;

        let promotion = page.data.into_iter().next().map(|p| ExternalPromotion {
            id: p.id,
            code: p.code,
        });
        debug!(found = promotion.is_some(), "Promotion code lookup finished");

        Ok(promotion)
    }
}

#[async_trait]
impl CheckoutGateway for StripeClient {
    #[instrument(skip(self, request), fields(plan_id = %request.plan_id))]
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let response = self
            .client
            .post(self.endpoint("/v1/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&checkout_session_form(request))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("checkout session creation failed: {}", e))
            })?;

        let session: CheckoutSessionObject =
            Self::read_json(response, "checkout session creation").await?;

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn request(promotion: Option<&str>) -> CheckoutSessionRequest {
        let mut metadata = BTreeMap::new();
        metadata.insert("planId".to_string(), "p-1".to_string());
        CheckoutSessionRequest {
            plan_id: Uuid::nil(),
            product_name: "Forever Page".to_string(),
            currency: "BRL".to_string(),
            unit_amount_cents: 1791,
            promotion_code_id: promotion.map(str::to_string),
            customer_email: None,
            metadata,
            success_url: "https://lovepage.example/ok".to_string(),
            cancel_url: "https://lovepage.example/cancel".to_string(),
        }
    }

    fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn form_carries_line_item_and_metadata() {
        let form = checkout_session_form(&request(None));

        assert_eq!(field(&form, "line_items[0][price_data][currency]"), Some("brl"));
        assert_eq!(field(&form, "line_items[0][price_data][unit_amount]"), Some("1791"));
        assert_eq!(field(&form, "metadata[planId]"), Some("p-1"));
        assert_eq!(field(&form, "discounts[0][promotion_code]"), None);
    }

    #[test]
    fn form_applies_provider_promotion() {
        let form = checkout_session_form(&request(Some("promo_42")));
        assert_eq!(field(&form, "discounts[0][promotion_code]"), Some("promo_42"));
    }

    #[test]
    fn from_config_requires_secret_key() {
        let cfg = AppConfig::new("sqlite::memory:".into(), "development".into());
        assert!(matches!(
            StripeClient::from_config(&cfg),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
