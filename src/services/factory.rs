use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    repositories::{CouponRepository, PartnerRepository, PlanRepository},
    services::{
        commerce::{
            checkout_service::{CheckoutGateway, CheckoutService, CheckoutSettings},
            pricing_service::PriceComposer,
        },
        coupons::CouponResolver,
        payments::StripeClient,
        promotions::PromotionLookup,
    },
};

/// Factory for creating repositories and services over one shared pool
#[derive(Clone)]
pub struct ServiceFactory {
    db_pool: Arc<DbPool>,
    config: AppConfig,
}

impl ServiceFactory {
    pub fn new(db_pool: Arc<DbPool>, config: AppConfig) -> Self {
        Self { db_pool, config }
    }

    pub fn coupon_repository(&self) -> CouponRepository {
        CouponRepository::new(self.db_pool.clone())
    }

    pub fn partner_repository(&self) -> PartnerRepository {
        PartnerRepository::new(self.db_pool.clone())
    }

    pub fn plan_repository(&self) -> PlanRepository {
        PlanRepository::new(self.db_pool.clone())
    }

    /// Resolver reading coupons from the database
    pub fn coupon_resolver(&self) -> CouponResolver {
        CouponResolver::new(Arc::new(self.coupon_repository()))
    }

    pub fn price_composer(&self, promotions: Arc<dyn PromotionLookup>) -> PriceComposer {
        PriceComposer::new(self.coupon_resolver(), promotions)
    }

    pub fn checkout_service(
        &self,
        promotions: Arc<dyn PromotionLookup>,
        gateway: Arc<dyn CheckoutGateway>,
    ) -> CheckoutService {
        CheckoutService::new(
            self.plan_repository(),
            self.price_composer(promotions),
            gateway,
            CheckoutSettings::from(&self.config),
        )
    }

    /// Checkout service backed by the configured payment provider for both
    /// promotion lookup and session creation.
    pub fn provider_checkout_service(&self) -> Result<CheckoutService, ServiceError> {
        let client = Arc::new(StripeClient::from_config(&self.config)?);
        Ok(self.checkout_service(client.clone(), client))
    }

    pub fn db_pool(&self) -> &Arc<DbPool> {
        &self.db_pool
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
