use std::{sync::Arc, time::Duration};

use common::{
    error::{AppError, Res},
    jwt::{TokenIssuer, TokenKind, TokenPair},
    misc::with_deadline,
};
use db::{dtos::user::UserCreateRequest, models::user::User, user::UserRepository};
use uuid::Uuid;

use crate::services::password::PasswordVerifier;

/// Registration and login on top of the credential store.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    passwords: Arc<PasswordVerifier>,
    issuer: Arc<TokenIssuer>,
    storage_timeout: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        passwords: Arc<PasswordVerifier>,
        issuer: Arc<TokenIssuer>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            users,
            passwords,
            issuer,
            storage_timeout,
        }
    }

    /// Creates the user and issues its first token pair.
    ///
    /// The user is kept even when issuance fails (e.g. the gate is full);
    /// the caller can log in afterwards.
    pub async fn register(&self, name: &str, email: &str, secret: &str) -> Res<TokenPair> {
        let email = normalize_email(email);

        if with_deadline(self.storage_timeout, self.users.exists_by_email(&email)).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = self.hash(secret).await?;
        let user = with_deadline(
            self.storage_timeout,
            self.users.create(UserCreateRequest {
                name: name.trim().to_string(),
                email,
                password_hash,
            }),
        )
        .await?;
        log::info!("Registered user {}", user.id);

        self.issuer.issue(user.id).inspect_err(|e| {
            log::warn!("User {} registered but no token issued: {}", user.id, e);
        })
    }

    /// Unknown email and wrong secret both end in `AppError::InvalidCredentials`
    /// after the same amount of hashing work.
    pub async fn login(&self, email: &str, secret: &str) -> Res<TokenPair> {
        let email = normalize_email(email);
        let user = with_deadline(self.storage_timeout, self.users.find_by_email(&email)).await?;

        let matches = self
            .check(secret, user.as_ref().map(|u| u.password_hash.clone()))
            .await?;

        match user {
            Some(user) if matches => self.issuer.issue(user.id),
            _ => Err(AppError::InvalidCredentials),
        }
    }

    /// Exchanges a refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Res<TokenPair> {
        let claims = self.issuer.verify(refresh_token, TokenKind::Refresh)?;
        let user = self.current_user(claims.sub).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::Unauthorized("Invalid token".to_string()),
            other => other,
        })?;
        self.issuer.issue(user.id)
    }

    pub async fn current_user(&self, user_id: Uuid) -> Res<User> {
        with_deadline(self.storage_timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn hash(&self, secret: &str) -> Res<String> {
        let passwords = self.passwords.clone();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || passwords.hash(&secret))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
    }

    async fn check(&self, secret: &str, digest: Option<String>) -> Res<bool> {
        let passwords = self.passwords.clone();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || match digest {
            Some(digest) => passwords.verify(&secret, &digest),
            None => {
                passwords.verify_dummy(&secret);
                Ok(false)
            }
        })
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
