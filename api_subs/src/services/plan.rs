use std::{sync::Arc, time::Duration};

use bigdecimal::{BigDecimal, Zero};
use common::{
    clock::Clock,
    error::{AppError, Res},
    misc::with_deadline,
};
use db::{
    dtos::plan::{PlanCreateRequest, PlanUpdateRequest},
    models::plan::Plan,
    plan::PlanRepository,
};
use uuid::Uuid;

pub const MAX_PLAN_LIST: i64 = 100;
/// About a century.
pub const MAX_DURATION_DAYS: i32 = 36_500;

pub struct PlanCatalog {
    plans: Arc<dyn PlanRepository>,
    clock: Arc<dyn Clock>,
    storage_timeout: Duration,
}

impl PlanCatalog {
    pub fn new(
        plans: Arc<dyn PlanRepository>,
        clock: Arc<dyn Clock>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            plans,
            clock,
            storage_timeout,
        }
    }

    pub async fn list(&self, limit: Option<i64>) -> Res<Vec<Plan>> {
        let limit = limit.unwrap_or(MAX_PLAN_LIST).clamp(1, MAX_PLAN_LIST);
        with_deadline(self.storage_timeout, self.plans.list(limit)).await
    }

    pub async fn get(&self, plan_id: Uuid) -> Res<Plan> {
        with_deadline(self.storage_timeout, self.plans.find_by_id(plan_id))
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
    }

    pub async fn create(&self, data: PlanCreateRequest) -> Res<Plan> {
        validate_name(&data.name)?;
        validate_price(&data.price)?;
        validate_duration(data.duration_days)?;

        let plan = with_deadline(self.storage_timeout, self.plans.create(data)).await?;
        log::info!("Created plan {} ({})", plan.name, plan.id);
        Ok(plan)
    }

    pub async fn update(&self, plan_id: Uuid, data: PlanUpdateRequest) -> Res<Plan> {
        if let Some(name) = &data.name {
            validate_name(name)?;
        }
        if let Some(price) = &data.price {
            validate_price(price)?;
        }
        if let Some(duration_days) = data.duration_days {
            validate_duration(duration_days)?;
        }

        with_deadline(self.storage_timeout, self.plans.update(plan_id, data))
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
    }

    /// Existing subscriptions keep pointing at a deleted plan.
    pub async fn delete(&self, plan_id: Uuid) -> Res<()> {
        let deleted = with_deadline(
            self.storage_timeout,
            self.plans.soft_delete(plan_id, self.clock.now()),
        )
        .await?;

        if deleted {
            log::info!("Deleted plan {}", plan_id);
            Ok(())
        } else {
            Err(AppError::NotFound("Plan not found".to_string()))
        }
    }
}

fn validate_name(name: &str) -> Res<()> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Plan name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_price(price: &BigDecimal) -> Res<()> {
    if price < &BigDecimal::zero() {
        return Err(AppError::BadRequest("Price must not be negative".to_string()));
    }
    Ok(())
}

fn validate_duration(duration_days: i32) -> Res<()> {
    if duration_days <= 0 {
        return Err(AppError::BadRequest(
            "Duration must be at least one day".to_string(),
        ));
    }
    if duration_days > MAX_DURATION_DAYS {
        return Err(AppError::BadRequest(format!(
            "Duration must not exceed {} days",
            MAX_DURATION_DAYS
        )));
    }
    Ok(())
}
