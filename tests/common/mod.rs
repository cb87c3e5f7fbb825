#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lovepage_api::{
    config::AppConfig,
    db,
    entities::{CouponModel, DiscountType, PlanModel},
    errors::ServiceError,
    repositories::{NewCoupon, NewPlan},
    services::{
        commerce::checkout_service::{CheckoutGateway, CheckoutSession, CheckoutSessionRequest},
        factory::ServiceFactory,
        promotions::{ExternalPromotion, PromotionLookup},
    },
};
use rust_decimal::Decimal;

/// Helper harness backed by a fresh in-memory SQLite database with all migrations applied.
pub struct TestApp {
    pub factory: ServiceFactory,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        // A single connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.auto_migrate = true;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        Self {
            factory: ServiceFactory::new(Arc::new(pool), cfg),
        }
    }

    pub async fn seed_plan(&self, price_cents: i64) -> PlanModel {
        self.factory
            .plan_repository()
            .create(NewPlan {
                name: "Forever Page".to_string(),
                description: Some("Commemorative page with photos".to_string()),
                price_cents,
            })
            .await
            .expect("seed plan")
    }

    pub async fn seed_coupon(&self, coupon: NewCoupon) -> CouponModel {
        self.factory
            .coupon_repository()
            .create(coupon)
            .await
            .expect("seed coupon")
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("RFC 3339 timestamp")
}

pub fn percentage_coupon(code: &str, percent: Decimal) -> NewCoupon {
    NewCoupon {
        code: code.to_string(),
        discount_type: DiscountType::Percentage,
        discount_value: percent,
        usage_limit: None,
        start_date: None,
        end_date: None,
        active: true,
        partner_id: None,
    }
}

pub fn fixed_coupon(code: &str, amount: Decimal) -> NewCoupon {
    NewCoupon {
        discount_type: DiscountType::FixedAmount,
        discount_value: amount,
        ..percentage_coupon(code, amount)
    }
}

/// In-memory provider promotion catalog that records every lookup.
#[derive(Default)]
pub struct FakePromotionLookup {
    promotions: HashMap<String, String>,
    unavailable: bool,
    lookups: Mutex<Vec<String>>,
}

impl FakePromotionLookup {
    pub fn with_promotion(code: &str, promotion_id: &str) -> Self {
        let mut promotions = HashMap::new();
        promotions.insert(code.to_string(), promotion_id.to_string());
        Self {
            promotions,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().expect("lookups lock").clone()
    }
}

#[async_trait]
impl PromotionLookup for FakePromotionLookup {
    async fn find_active_promotion(
        &self,
        code: &str,
    ) -> Result<Option<ExternalPromotion>, ServiceError> {
        self.lookups
            .lock()
            .expect("lookups lock")
            .push(code.to_string());

        if self.unavailable {
            return Err(ServiceError::ExternalServiceError(
                "provider timed out".to_string(),
            ));
        }

        Ok(self.promotions.get(code).map(|id| ExternalPromotion {
            id: id.clone(),
            code: code.to_string(),
        }))
    }
}

/// Gateway that accepts every request and keeps a copy of it.
#[derive(Default)]
pub struct RecordingGateway {
    requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl RecordingGateway {
    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CheckoutGateway for RecordingGateway {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let mut requests = self.requests.lock().expect("requests lock");
        requests.push(request.clone());
        Ok(CheckoutSession {
            id: format!("cs_test_{}", requests.len()),
            url: Some("https://checkout.example/pay".to_string()),
        })
    }
}
