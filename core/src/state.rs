use std::sync::Arc;

use api_auth::{AuthService, PasswordVerifier, UserService};
use api_subs::{PlanCatalog, SubscriptionRegistry};
use common::{clock::Clock, env_config::Config, error::Res, jwt::TokenIssuer};
use db::{
    plan::{PgPlanRepository, PlanRepository},
    subscription::{PgSubscriptionRepository, SubscriptionRepository},
    user::{PgUserRepository, UserRepository},
};
use sqlx::PgPool;

/// Services shared by every worker.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub registry: Arc<SubscriptionRegistry>,
    pub catalog: Arc<PlanCatalog>,
}

impl AppState {
    pub fn postgres(config: &Config, pool: Arc<PgPool>, clock: Arc<dyn Clock>) -> Res<Self> {
        Self::build(
            config,
            clock,
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgPlanRepository::new(pool.clone())),
            Arc::new(PgSubscriptionRepository::new(pool)),
            PasswordVerifier::new()?,
        )
    }

    pub fn build(
        config: &Config,
        clock: Arc<dyn Clock>,
        users: Arc<dyn UserRepository>,
        plans: Arc<dyn PlanRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        passwords: PasswordVerifier,
    ) -> Res<Self> {
        let issuer = Arc::new(TokenIssuer::new(&config.jwt_config, clock.clone())?);
        let timeout = config.storage_timeout;

        let auth = AuthService::new(users.clone(), Arc::new(passwords), issuer.clone(), timeout);
        let accounts = UserService::new(users.clone(), clock.clone(), timeout);
        let registry = SubscriptionRegistry::new(
            users,
            plans.clone(),
            subscriptions,
            clock.clone(),
            config.max_page_size,
            timeout,
        );
        let catalog = PlanCatalog::new(plans, clock, timeout);

        Ok(Self {
            issuer,
            auth: Arc::new(auth),
            users: Arc::new(accounts),
            registry: Arc::new(registry),
            catalog: Arc::new(catalog),
        })
    }
}
