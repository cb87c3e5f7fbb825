use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::coupon::{Column as CouponColumn, Entity as Coupon};
use crate::entities::partner::{
    ActiveModel as PartnerActiveModel, Entity as Partner, Model as PartnerModel,
};
use crate::errors::ServiceError;
use crate::repositories::Repository;

use super::BaseRepository;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPartner {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub contact_email: Option<String>,
}

/// Repository for referral partners
#[derive(Debug, Clone)]
pub struct PartnerRepository {
    base: BaseRepository,
}

impl PartnerRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewPartner) -> Result<PartnerModel, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let partner = PartnerActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            contact_email: Set(input.contact_email),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = partner.insert(self.base.get_db()).await?;
        info!(partner_id = %created.id, "Partner created");
        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PartnerModel>, ServiceError> {
        Partner::find_by_id(id)
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Delete a partner. Coupons that referenced it are kept and lose the reference.
    ///
    /// Returns `false` if no partner with `id` existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let txn = self.base.get_db().begin().await?;

        let detached = Coupon::update_many()
            .col_expr(CouponColumn::PartnerId, Expr::value(Option::<Uuid>::None))
            .col_expr(CouponColumn::UpdatedAt, Expr::value(Utc::now()))
            .filter(CouponColumn::PartnerId.eq(id))
            .exec(&txn)
            .await?;

        let deleted = Partner::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(
            partner_id = %id,
            coupons_detached = detached.rows_affected,
            deleted = deleted.rows_affected == 1,
            "Partner delete finished"
        );
        Ok(deleted.rows_affected == 1)
    }
}
