use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::coupon::{
    canonical_code, ActiveModel as CouponActiveModel, Column, DiscountType, Entity as Coupon,
    Model as CouponModel,
};
use crate::errors::ServiceError;
use crate::repositories::Repository;
use crate::services::coupons::CouponStore;

use super::BaseRepository;

/// Input for issuing a local coupon.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_coupon_terms"))]
pub struct NewCoupon {
    #[validate(length(min = 2, max = 64))]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub partner_id: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

fn validate_coupon_terms(coupon: &NewCoupon) -> Result<(), ValidationError> {
    if coupon.code.trim().is_empty() {
        return Err(ValidationError::new("code_blank"));
    }
    if coupon.discount_value <= Decimal::ZERO {
        return Err(ValidationError::new("discount_value_not_positive"));
    }
    if coupon.discount_type == DiscountType::Percentage
        && coupon.discount_value >= Decimal::ONE_HUNDRED
    {
        return Err(ValidationError::new("percentage_out_of_range"));
    }
    if let (Some(start), Some(end)) = (coupon.start_date, coupon.end_date) {
        if end < start {
            return Err(ValidationError::new("window_end_before_start"));
        }
    }
    Ok(())
}

/// Repository for local coupons
#[derive(Debug, Clone)]
pub struct CouponRepository {
    base: BaseRepository,
}

impl CouponRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Validate and insert a coupon. The code is stored in canonical form.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: NewCoupon) -> Result<CouponModel, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let code = canonical_code(&input.code);
        let coupon = CouponActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            usage_limit: Set(input.usage_limit),
            used_count: Set(0),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            active: Set(input.active),
            partner_id: Set(input.partner_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = coupon
            .insert(self.base.get_db())
            .await
            .map_err(|e| map_insert_error(e, &code))?;

        info!(coupon_id = %created.id, code = %created.code, "Coupon created");
        Ok(created)
    }

    /// Find a coupon by code, ignoring case and surrounding whitespace
    pub async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        Coupon::find()
            .filter(Column::Code.eq(canonical_code(code)))
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CouponModel>, ServiceError> {
        Coupon::find_by_id(id)
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Count one use of an active coupon.
    ///
    /// The increment and the limit check run as a single conditional UPDATE, so
    /// concurrent redemptions can never push `used_count` past `usage_limit`.
    /// Returns `false` when the coupon is missing, inactive or exhausted.
    #[instrument(skip(self))]
    pub async fn record_redemption(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Coupon::update_many()
            .col_expr(Column::UsedCount, Expr::col(Column::UsedCount).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .filter(Column::Active.eq(true))
            .filter(
                Condition::any()
                    .add(Column::UsageLimit.is_null())
                    .add(Expr::col(Column::UsedCount).lt(Expr::col(Column::UsageLimit))),
            )
            .exec(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)?;

        let redeemed = result.rows_affected == 1;
        if redeemed {
            info!(coupon_id = %id, "Coupon redemption recorded");
        } else {
            warn!(coupon_id = %id, "Coupon redemption refused");
        }
        Ok(redeemed)
    }
}

fn map_insert_error(err: DbErr, code: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict(format!("Coupon code {} already exists", code))
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            ServiceError::InvalidInput("Unknown partner for coupon".to_string())
        }
        _ => ServiceError::DatabaseError(err),
    }
}

#[async_trait]
impl CouponStore for CouponRepository {
    async fn get_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        Coupon::find()
            .filter(Column::Code.eq(code))
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }
}
