use std::{sync::Arc, time::Duration};

use common::{
    clock::Clock,
    error::{AppError, Res},
    misc::with_deadline,
};
use db::{dtos::user::UserUpdateRequest, models::user::User, user::UserRepository};
use uuid::Uuid;

use crate::{
    dtos::user::{MAX_USER_LIST, UserUpdateBody},
    services::auth::normalize_email,
};

/// Account management for registered users.
pub struct UserService {
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
    storage_timeout: Duration,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            users,
            clock,
            storage_timeout,
        }
    }

    pub async fn list(&self, limit: Option<i64>) -> Res<Vec<User>> {
        let limit = limit.unwrap_or(MAX_USER_LIST).clamp(1, MAX_USER_LIST);
        with_deadline(self.storage_timeout, self.users.list(limit)).await
    }

    pub async fn get(&self, user_id: Uuid) -> Res<User> {
        with_deadline(self.storage_timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn update(&self, user_id: Uuid, body: UserUpdateBody) -> Res<User> {
        body.validate()?;
        let data = UserUpdateRequest {
            name: body.name.map(|name| name.trim().to_string()),
            email: body.email.as_deref().map(normalize_email),
        };

        with_deadline(self.storage_timeout, self.users.update(user_id, data))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Also cancels the user's active subscription.
    pub async fn delete(&self, user_id: Uuid) -> Res<()> {
        let deleted = with_deadline(
            self.storage_timeout,
            self.users.soft_delete(user_id, self.clock.now()),
        )
        .await?;

        if deleted {
            log::info!("Deleted user {}", user_id);
            Ok(())
        } else {
            Err(AppError::NotFound("User not found".to_string()))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::clock::ManualClock;
    use db::{dtos::user::UserCreateRequest, memory::MemoryStore};

    pub(crate) fn service(store: Arc<MemoryStore>) -> UserService {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        UserService::new(store, clock, Duration::from_secs(5))
    }

    async fn user(store: &MemoryStore, email: &str) -> User {
        UserRepository::create(
            store,
            UserCreateRequest {
                name: "Ann".to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn update_trims_and_normalizes() {
        let store = Arc::new(MemoryStore::new());
        let users = service(store.clone());
        let ann = user(&store, "ann@x.io").await;

        let updated = users
            .update(
                ann.id,
                UserUpdateBody {
                    name: Some("  Annie ".to_string()),
                    email: Some(" ANNIE@x.io".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Annie");
        assert_eq!(updated.email, "annie@x.io");
    }

    #[tokio::test]
    async fn update_to_a_taken_email_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let users = service(store.clone());
        let ann = user(&store, "ann@x.io").await;
        user(&store, "bob@x.io").await;

        let err = users
            .update(
                ann.id,
                UserUpdateBody {
                    email: Some("Bob@x.io".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_hides_the_user_once() {
        let store = Arc::new(MemoryStore::new());
        let users = service(store.clone());
        let ann = user(&store, "ann@x.io").await;
        let bob = user(&store, "bob@x.io").await;

        users.delete(ann.id).await.unwrap();

        assert!(matches!(users.get(ann.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(users.delete(ann.id).await, Err(AppError::NotFound(_))));
        let listed: Vec<Uuid> = users.list(None).await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(listed, vec![bob.id]);
    }

    #[tokio::test]
    async fn list_limit_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let users = service(store.clone());
        user(&store, "ann@x.io").await;
        user(&store, "bob@x.io").await;

        assert_eq!(users.list(Some(0)).await.unwrap().len(), 1);
        assert_eq!(users.list(Some(1000)).await.unwrap().len(), 2);
    }
}
