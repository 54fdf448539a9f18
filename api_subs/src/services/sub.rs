use std::{sync::Arc, time::Duration};

use chrono::TimeDelta;
use common::{
    clock::Clock,
    error::{AppError, Res},
    misc::{total_pages, with_deadline},
};
use db::{
    dtos::subscription::{SubscriptionCreateRequest, SubscriptionStateUpdate},
    models::subscription::{Subscription, SubscriptionStats, SubscriptionStatus},
    plan::PlanRepository,
    subscription::SubscriptionRepository,
    user::UserRepository,
};
use uuid::Uuid;

use crate::dtos::sub::{Page, SubscriptionPatch};

pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Subscription lifecycle on top of the user, plan and subscription stores.
///
/// A user holds at most one active subscription. The check here only gives a
/// clean early error; the store enforces it atomically with the insert.
pub struct SubscriptionRegistry {
    users: Arc<dyn UserRepository>,
    plans: Arc<dyn PlanRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    clock: Arc<dyn Clock>,
    max_page_size: i64,
    storage_timeout: Duration,
}

impl SubscriptionRegistry {
    pub fn new(
        users: Arc<dyn UserRepository>,
        plans: Arc<dyn PlanRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        clock: Arc<dyn Clock>,
        max_page_size: i64,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            users,
            plans,
            subscriptions,
            clock,
            max_page_size: max_page_size.max(1),
            storage_timeout,
        }
    }

    pub async fn subscribe(&self, user_id: Uuid, plan_id: Uuid) -> Res<Subscription> {
        self.require_user(user_id).await?;
        let plan = with_deadline(self.storage_timeout, self.plans.find_by_id(plan_id))
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        let now = self.clock.now();
        if let Some(current) = with_deadline(
            self.storage_timeout,
            self.subscriptions.find_active_by_user(user_id),
        )
        .await?
        {
            if !current.is_expired_at(now) {
                return Err(AppError::Conflict(
                    "User already has an active subscription".to_string(),
                ));
            }
            // lapsed but never swept; retire it so the slot frees up
            self.transition(&current, SubscriptionStatus::Expired, current.expires_at)
                .await?;
        }

        let expires_at = now
            .checked_add_signed(TimeDelta::days(i64::from(plan.duration_days)))
            .ok_or_else(|| AppError::Internal("Expiry date out of range".to_string()))?;

        let subscription = with_deadline(
            self.storage_timeout,
            self.subscriptions.create(SubscriptionCreateRequest {
                user_id,
                plan_id: plan.id,
                amount: plan.price.clone(),
                start_date: now,
                expires_at,
            }),
        )
        .await?;

        log::info!(
            "User {} subscribed to plan {} until {}",
            user_id,
            plan.id,
            expires_at
        );
        Ok(subscription)
    }

    /// Reads apply lapsed expiry without writing it.
    pub async fn get(&self, subscription_id: Uuid) -> Res<Subscription> {
        let subscription = self.find(subscription_id).await?;
        Ok(self.observed(subscription))
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        self.require_user(user_id).await?;
        let subscriptions =
            with_deadline(self.storage_timeout, self.subscriptions.find_by_user(user_id)).await?;
        Ok(subscriptions.into_iter().map(|s| self.observed(s)).collect())
    }

    /// Administrative edit. A status change must be a legal transition.
    pub async fn update(&self, subscription_id: Uuid, patch: SubscriptionPatch) -> Res<Subscription> {
        let current = self.find(subscription_id).await?;
        let status = patch.status.unwrap_or(current.status);
        let expires_at = patch.expires_at.unwrap_or(current.expires_at);

        if !current.status.can_transition_to(status) {
            return Err(AppError::Conflict(format!(
                "Cannot change subscription from {} to {}",
                current.status, status
            )));
        }

        self.transition(&current, status, expires_at).await
    }

    pub async fn cancel(&self, subscription_id: Uuid) -> Res<Subscription> {
        let current = self.find(subscription_id).await?;
        let observed = current.effective_status(self.clock.now());
        if !observed.is_active() {
            return Err(AppError::Conflict(format!(
                "Subscription is already {}",
                observed
            )));
        }

        let cancelled = self
            .transition(&current, SubscriptionStatus::Cancelled, current.expires_at)
            .await?;
        log::info!("Subscription {} cancelled", subscription_id);
        Ok(cancelled)
    }

    /// Soft delete; an active subscription is cancelled along the way.
    pub async fn delete(&self, subscription_id: Uuid) -> Res<()> {
        let deleted = with_deadline(
            self.storage_timeout,
            self.subscriptions.soft_delete(subscription_id, self.clock.now()),
        )
        .await?;

        if !deleted {
            return Err(AppError::NotFound("Subscription not found".to_string()));
        }
        log::info!("Subscription {} deleted", subscription_id);
        Ok(())
    }

    /// `page < 1` reads as 1, `page_size < 1` as the default, and page size
    /// is capped at the configured maximum.
    pub async fn list_page(&self, page: i64, page_size: i64) -> Res<Page<Subscription>> {
        let page = page.max(1);
        let per_page = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        }
        .min(self.max_page_size);
        let offset = (page - 1).saturating_mul(per_page);

        let (items, total) = with_deadline(
            self.storage_timeout,
            self.subscriptions.find_page(per_page, offset),
        )
        .await?;

        Ok(Page {
            items: items.into_iter().map(|s| self.observed(s)).collect(),
            total,
            page,
            per_page,
            total_pages: total_pages(total, per_page),
        })
    }

    pub async fn stats(&self) -> Res<SubscriptionStats> {
        with_deadline(self.storage_timeout, self.subscriptions.count_and_sum()).await
    }

    /// Writes down every expiry that has lapsed. Returns how many changed.
    pub async fn expire_due(&self) -> Res<u64> {
        let expired = with_deadline(
            self.storage_timeout,
            self.subscriptions.expire_due(self.clock.now()),
        )
        .await?;
        if expired > 0 {
            log::info!("Expired {} subscriptions", expired);
        }
        Ok(expired)
    }

    async fn require_user(&self, user_id: Uuid) -> Res<()> {
        with_deadline(self.storage_timeout, self.users.find_by_id(user_id))
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn find(&self, subscription_id: Uuid) -> Res<Subscription> {
        with_deadline(
            self.storage_timeout,
            self.subscriptions.find_by_id(subscription_id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    async fn transition(
        &self,
        current: &Subscription,
        status: SubscriptionStatus,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Res<Subscription> {
        let update = SubscriptionStateUpdate {
            expected_status: current.status,
            status,
            expires_at,
            updated_at: self.clock.now(),
        };

        with_deadline(
            self.storage_timeout,
            self.subscriptions.update_state(current.id, update),
        )
        .await?
        .ok_or_else(|| {
            AppError::Conflict("Subscription was modified concurrently".to_string())
        })
    }

    fn observed(&self, mut subscription: Subscription) -> Subscription {
        let status = subscription.effective_status(self.clock.now());
        if status != subscription.status {
            subscription.status = status;
            subscription.active = status.is_active();
        }
        subscription
    }
}
