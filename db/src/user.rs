use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    dtos::user::{UserCreateRequest, UserUpdateRequest},
    models::user::User,
};

/// Credential store.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Res<Option<User>>;
    async fn find_by_id(&self, user_id: Uuid) -> Res<Option<User>>;
    async fn exists_by_email(&self, email: &str) -> Res<bool>;
    /// Fails with `AppError::Conflict` when the email is already taken.
    async fn create(&self, data: UserCreateRequest) -> Res<User>;
    /// Oldest first.
    async fn list(&self, limit: i64) -> Res<Vec<User>>;
    /// Fails with `AppError::Conflict` when the new email is taken.
    async fn update(&self, user_id: Uuid, data: UserUpdateRequest) -> Res<Option<User>>;
    /// Marks the user deleted and cancels its active subscription, if any.
    /// The email stays reserved.
    async fn soft_delete(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool>;
}

pub async fn exists_user_by_email<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    email: &str,
) -> Res<bool> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_user_by_email<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    email: &str,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 AND deleted_at IS NULL")
        .bind(email)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_user_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: UserCreateRequest,
) -> Res<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(data.name)
    .bind(data.email)
    .bind(data.password_hash)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_users<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    limit: i64,
) -> Res<Vec<User>> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE deleted_at IS NULL ORDER BY created_at, id LIMIT $1",
    )
    .bind(limit)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn update_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    data: UserUpdateRequest,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = COALESCE($2, name),
            email = COALESCE($3, email),
            updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(data.name)
    .bind(data.email)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn soft_delete_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Res<bool> {
    sqlx::query(
        "UPDATE users SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(user_id)
    .bind(now)
    .execute(executor)
    .await
    .map(|done| done.rows_affected() > 0)
    .map_err(AppError::from)
}

pub async fn cancel_active_subscription_of_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Res<u64> {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'cancelled', active = FALSE, updated_at = $2
        WHERE user_id = $1 AND active AND deleted_at IS NULL
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(executor)
    .await
    .map(|done| done.rows_affected())
    .map_err(AppError::from)
}

pub struct PgUserRepository {
    pool: Arc<PgPool>,
}

impl PgUserRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Res<Option<User>> {
        get_user_by_email(&*self.pool, email).await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Res<Option<User>> {
        get_user_by_id(&*self.pool, user_id).await
    }

    async fn exists_by_email(&self, email: &str) -> Res<bool> {
        exists_user_by_email(&*self.pool, email).await
    }

    async fn create(&self, data: UserCreateRequest) -> Res<User> {
        insert_user(&*self.pool, data).await
    }

    async fn list(&self, limit: i64) -> Res<Vec<User>> {
        get_users(&*self.pool, limit).await
    }

    async fn update(&self, user_id: Uuid, data: UserUpdateRequest) -> Res<Option<User>> {
        update_user(&*self.pool, user_id, data).await
    }

    async fn soft_delete(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        let mut tx = self.pool.begin().await?;
        if !soft_delete_user(&mut *tx, user_id, now).await? {
            return Ok(false);
        }
        cancel_active_subscription_of_user(&mut *tx, user_id, now).await?;
        tx.commit().await?;
        Ok(true)
    }
}
