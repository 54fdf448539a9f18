use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    dtos::subscription::{SubscriptionCreateRequest, SubscriptionStateUpdate},
    models::subscription::{Subscription, SubscriptionStats},
};

/// Subscription store.
///
/// Implementations own the "one active subscription per user" invariant:
/// `create` must fail with `AppError::Conflict` if the user already has an
/// active, non-deleted subscription, atomically with the insert.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, data: SubscriptionCreateRequest) -> Res<Subscription>;
    async fn find_by_id(&self, subscription_id: Uuid) -> Res<Option<Subscription>>;
    async fn find_active_by_user(&self, user_id: Uuid) -> Res<Option<Subscription>>;
    async fn find_by_user(&self, user_id: Uuid) -> Res<Vec<Subscription>>;
    /// Applies `update` only if the record still has `update.expected_status`.
    /// Returns `None` when nothing matched.
    async fn update_state(
        &self,
        subscription_id: Uuid,
        update: SubscriptionStateUpdate,
    ) -> Res<Option<Subscription>>;
    /// Marks the record deleted; an active record is cancelled at the same time.
    async fn soft_delete(&self, subscription_id: Uuid, now: DateTime<Utc>) -> Res<bool>;
    async fn count_and_sum(&self) -> Res<SubscriptionStats>;
    /// Newest first. Returns the page and the total number of records.
    async fn find_page(&self, limit: i64, offset: i64) -> Res<(Vec<Subscription>, i64)>;
    /// Flips every active record with `expires_at < now` to expired.
    async fn expire_due(&self, now: DateTime<Utc>) -> Res<u64>;
}

pub async fn insert_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: SubscriptionCreateRequest,
) -> Res<Subscription> {
    // the partial unique index subscriptions_one_active_per_user rejects a
    // second active row for the same user
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (user_id, plan_id, status, amount, start_date, expires_at, active, created_at, updated_at)
        VALUES ($1, $2, 'active', $3, $4, $5, TRUE, $4, $4)
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.plan_id)
    .bind(data.amount)
    .bind(data.start_date)
    .bind(data.expires_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_subscription_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: Uuid,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(subscription_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_active_subscription_by_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = $1 AND active AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_subscriptions_by_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        SELECT * FROM subscriptions
        WHERE user_id = $1 AND deleted_at IS NULL
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn update_subscription_state<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: Uuid,
    update: SubscriptionStateUpdate,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET status = $3, active = $4, expires_at = $5, updated_at = $6
        WHERE id = $1 AND status = $2 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(subscription_id)
    .bind(update.expected_status)
    .bind(update.status)
    .bind(update.status.is_active())
    .bind(update.expires_at)
    .bind(update.updated_at)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn soft_delete_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: Uuid,
    now: DateTime<Utc>,
) -> Res<bool> {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET deleted_at = $2,
            updated_at = $2,
            active = FALSE,
            status = CASE WHEN status = 'active' THEN 'cancelled'::subscription_status ELSE status END
        WHERE id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(subscription_id)
    .bind(now)
    .execute(executor)
    .await
    .map(|done| done.rows_affected() > 0)
    .map_err(AppError::from)
}

pub async fn get_subscription_stats<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<SubscriptionStats> {
    sqlx::query_as::<_, SubscriptionStats>(
        r#"
        SELECT COUNT(*) AS total_subscriptions,
               COALESCE(SUM(amount), 0) AS total_amount
        FROM subscriptions
        WHERE deleted_at IS NULL
        "#,
    )
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn count_subscriptions<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscriptions WHERE deleted_at IS NULL")
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_subscriptions_page<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    limit: i64,
    offset: i64,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        SELECT * FROM subscriptions
        WHERE deleted_at IS NULL
        ORDER BY created_at DESC, id DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn expire_due_subscriptions<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    now: DateTime<Utc>,
) -> Res<u64> {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'expired', active = FALSE, updated_at = $1
        WHERE active AND deleted_at IS NULL AND expires_at < $1
        "#,
    )
    .bind(now)
    .execute(executor)
    .await
    .map(|done| done.rows_affected())
    .map_err(AppError::from)
}

pub struct PgSubscriptionRepository {
    pool: Arc<PgPool>,
}

impl PgSubscriptionRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn create(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        insert_subscription(&*self.pool, data).await
    }

    async fn find_by_id(&self, subscription_id: Uuid) -> Res<Option<Subscription>> {
        get_subscription_by_id(&*self.pool, subscription_id).await
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Res<Option<Subscription>> {
        get_active_subscription_by_user(&*self.pool, user_id).await
    }

    async fn find_by_user(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        get_subscriptions_by_user(&*self.pool, user_id).await
    }

    async fn update_state(
        &self,
        subscription_id: Uuid,
        update: SubscriptionStateUpdate,
    ) -> Res<Option<Subscription>> {
        update_subscription_state(&*self.pool, subscription_id, update).await
    }

    async fn soft_delete(&self, subscription_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        soft_delete_subscription(&*self.pool, subscription_id, now).await
    }

    async fn count_and_sum(&self) -> Res<SubscriptionStats> {
        get_subscription_stats(&*self.pool).await
    }

    async fn find_page(&self, limit: i64, offset: i64) -> Res<(Vec<Subscription>, i64)> {
        // one snapshot for both the count and the rows
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        let total = count_subscriptions(&mut *tx).await?;
        let items = get_subscriptions_page(&mut *tx, limit, offset).await?;
        tx.commit().await?;
        Ok((items, total))
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Res<u64> {
        expire_due_subscriptions(&*self.pool, now).await
    }
}
