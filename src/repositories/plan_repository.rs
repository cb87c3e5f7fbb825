use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::entities::plan::{
    ActiveModel as PlanActiveModel, Column, Entity as Plan, Model as PlanModel,
};
use crate::errors::ServiceError;
use crate::repositories::Repository;

use super::BaseRepository;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPlan {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub price_cents: i64,
}

/// Repository for purchasable plans
#[derive(Debug, Clone)]
pub struct PlanRepository {
    base: BaseRepository,
}

impl PlanRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn create(&self, input: NewPlan) -> Result<PlanModel, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let plan = PlanActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            price_cents: Set(input.price_cents),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = plan.insert(self.base.get_db()).await?;
        info!(plan_id = %created.id, price_cents = created.price_cents, "Plan created");
        Ok(created)
    }

    /// Find a plan that can still be purchased
    pub async fn find_active(&self, id: Uuid) -> Result<Option<PlanModel>, ServiceError> {
        Plan::find_by_id(id)
            .filter(Column::Active.eq(true))
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn list_active(&self) -> Result<Vec<PlanModel>, ServiceError> {
        Plan::find()
            .filter(Column::Active.eq(true))
            .order_by_asc(Column::PriceCents)
            .all(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }
}
