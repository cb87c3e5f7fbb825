use crate::{
    config::AppConfig,
    entities::plan::Model as PlanModel,
    errors::ServiceError,
    repositories::plan_repository::PlanRepository,
    services::commerce::pricing_service::{CheckoutQuote, PriceComposer},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const META_PLAN_ID: &str = "planId";

/// Everything the payment provider needs to open a hosted checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSessionRequest {
    pub plan_id: Uuid,
    pub product_name: String,
    pub currency: String,
    /// Amount charged before any provider-side promotion, in minor units.
    pub unit_amount_cents: i64,
    /// Provider promotion applied natively by the provider.
    pub promotion_code_id: Option<String>,
    pub customer_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Opaque session returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl From<&AppConfig> for CheckoutSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            currency: cfg.currency.to_uppercase(),
            success_url: cfg.checkout_success_url.clone(),
            cancel_url: cfg.checkout_cancel_url.clone(),
        }
    }
}

/// Builds the provider request for a plan and a composed quote.
pub fn build_session_request(
    plan: &PlanModel,
    quote: &CheckoutQuote,
    customer_email: Option<String>,
    settings: &CheckoutSettings,
) -> CheckoutSessionRequest {
    let mut metadata = quote.metadata.clone();
    metadata.insert(META_PLAN_ID.to_string(), plan.id.to_string());

    CheckoutSessionRequest {
        plan_id: plan.id,
        product_name: plan.name.clone(),
        currency: settings.currency.clone(),
        unit_amount_cents: quote.quote.final_amount,
        promotion_code_id: quote.promotion_reference().map(str::to_string),
        customer_email,
        metadata,
        success_url: settings.success_url.clone(),
        cancel_url: settings.cancel_url.clone(),
    }
}

/// Turns a plan selection plus optional discount code into a hosted checkout.
#[derive(Clone)]
pub struct CheckoutService {
    plans: PlanRepository,
    composer: PriceComposer,
    gateway: Arc<dyn CheckoutGateway>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        plans: PlanRepository,
        composer: PriceComposer,
        gateway: Arc<dyn CheckoutGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            plans,
            composer,
            gateway,
            settings,
        }
    }

    /// Prices the plan and builds the provider request without calling the provider.
    #[instrument(skip(self, customer_email))]
    pub async fn prepare_checkout(
        &self,
        plan_id: Uuid,
        raw_code: Option<&str>,
        customer_email: Option<String>,
        reference_time: DateTime<Utc>,
    ) -> Result<CheckoutSessionRequest, ServiceError> {
        let plan = self
            .plans
            .find_active(plan_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Plan {} not found", plan_id)))?;

        let quote = self
            .composer
            .compose(plan.price_cents, raw_code, reference_time)
            .await
            .map_err(|rejection| {
                warn!(%plan_id, %rejection, "Checkout rejected");
                ServiceError::from(rejection)
            })?;

        Ok(build_session_request(
            &plan,
            &quote,
            customer_email,
            &self.settings,
        ))
    }

    /// Prepares the checkout and opens a session with the payment provider.
    #[instrument(skip(self, customer_email))]
    pub async fn start_checkout(
        &self,
        plan_id: Uuid,
        raw_code: Option<&str>,
        customer_email: Option<String>,
    ) -> Result<CheckoutSession, ServiceError> {
        let request = self
            .prepare_checkout(plan_id, raw_code, customer_email, Utc::now())
            .await?;

        let session = self.gateway.create_session(&request).await?;

        info!(
            %plan_id,
            session_id = %session.id,
            amount = request.unit_amount_cents,
            promotion = ?request.promotion_code_id,
            "Checkout session created"
        );

        Ok(session)
    }
}
