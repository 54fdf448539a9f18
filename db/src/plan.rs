use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    dtos::plan::{PlanCreateRequest, PlanUpdateRequest},
    models::plan::Plan,
};

/// Plan catalog store.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find_by_id(&self, plan_id: Uuid) -> Res<Option<Plan>>;
    async fn list(&self, limit: i64) -> Res<Vec<Plan>>;
    /// Fails with `AppError::Conflict` when the name is already taken.
    async fn create(&self, data: PlanCreateRequest) -> Res<Plan>;
    async fn update(&self, plan_id: Uuid, data: PlanUpdateRequest) -> Res<Option<Plan>>;
    async fn soft_delete(&self, plan_id: Uuid, now: DateTime<Utc>) -> Res<bool>;
}

pub async fn get_plan_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: Uuid,
) -> Res<Option<Plan>> {
    sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1 AND deleted_at IS NULL")
        .bind(plan_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_plans<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    limit: i64,
) -> Res<Vec<Plan>> {
    sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE deleted_at IS NULL ORDER BY price, name LIMIT $1",
    )
    .bind(limit)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_plan<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: PlanCreateRequest,
) -> Res<Plan> {
    sqlx::query_as::<_, Plan>(
        r#"
        INSERT INTO plans (name, description, price, duration_days)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(data.name)
    .bind(data.description)
    .bind(data.price)
    .bind(data.duration_days)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn update_plan<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: Uuid,
    data: PlanUpdateRequest,
) -> Res<Option<Plan>> {
    sqlx::query_as::<_, Plan>(
        r#"
        UPDATE plans
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            price = COALESCE($4, price),
            duration_days = COALESCE($5, duration_days),
            updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(plan_id)
    .bind(data.name)
    .bind(data.description)
    .bind(data.price)
    .bind(data.duration_days)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn soft_delete_plan<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: Uuid,
    now: DateTime<Utc>,
) -> Res<bool> {
    sqlx::query(
        "UPDATE plans SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(plan_id)
    .bind(now)
    .execute(executor)
    .await
    .map(|done| done.rows_affected() > 0)
    .map_err(AppError::from)
}

pub struct PgPlanRepository {
    pool: Arc<PgPool>,
}

impl PgPlanRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanRepository for PgPlanRepository {
    async fn find_by_id(&self, plan_id: Uuid) -> Res<Option<Plan>> {
        get_plan_by_id(&*self.pool, plan_id).await
    }

    async fn list(&self, limit: i64) -> Res<Vec<Plan>> {
        get_plans(&*self.pool, limit).await
    }

    async fn create(&self, data: PlanCreateRequest) -> Res<Plan> {
        insert_plan(&*self.pool, data).await
    }

    async fn update(&self, plan_id: Uuid, data: PlanUpdateRequest) -> Res<Option<Plan>> {
        update_plan(&*self.pool, plan_id, data).await
    }

    async fn soft_delete(&self, plan_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        soft_delete_plan(&*self.pool, plan_id, now).await
    }
}
