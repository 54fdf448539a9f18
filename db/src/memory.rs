//! In-memory implementations of the repository traits.
//!
//! Every operation runs under one mutex, so check-and-insert is atomic the
//! same way the unique indexes make it atomic in PostgreSQL.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use uuid::Uuid;

use crate::{
    dtos::{
        plan::{PlanCreateRequest, PlanUpdateRequest},
        subscription::{SubscriptionCreateRequest, SubscriptionStateUpdate},
        user::{UserCreateRequest, UserUpdateRequest},
    },
    models::{
        plan::Plan,
        subscription::{Subscription, SubscriptionStats, SubscriptionStatus},
        user::User,
    },
    plan::PlanRepository,
    subscription::SubscriptionRepository,
    user::UserRepository,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    plans: HashMap<Uuid, Plan>,
    // insertion order doubles as creation order
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Res<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Res<Option<User>> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.email == email && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Res<Option<User>> {
        Ok(self
            .state()?
            .users
            .get(&user_id)
            .filter(|u| u.deleted_at.is_none())
            .cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Res<bool> {
        Ok(self.state()?.users.values().any(|u| u.email == email))
    }

    async fn create(&self, data: UserCreateRequest) -> Res<User> {
        let mut state = self.state()?;
        if state.users.values().any(|u| u.email == data.email) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: data.name,
            email: data.email,
            password_hash: data.password_hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list(&self, limit: i64) -> Res<Vec<User>> {
        let state = self.state()?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.deleted_at.is_none())
            .cloned()
            .collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        users.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(users)
    }

    async fn update(&self, user_id: Uuid, data: UserUpdateRequest) -> Res<Option<User>> {
        let mut state = self.state()?;
        if let Some(email) = &data.email {
            if state
                .users
                .values()
                .any(|u| u.id != user_id && &u.email == email)
            {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }

        let Some(user) = state
            .users
            .get_mut(&user_id)
            .filter(|u| u.deleted_at.is_none())
        else {
            return Ok(None);
        };

        if let Some(name) = data.name {
            user.name = name;
        }
        if let Some(email) = data.email {
            user.email = email;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn soft_delete(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        let mut state = self.state()?;
        let Some(user) = state
            .users
            .get_mut(&user_id)
            .filter(|u| u.deleted_at.is_none())
        else {
            return Ok(false);
        };
        user.deleted_at = Some(now);
        user.updated_at = now;

        for sub in state
            .subscriptions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.active && s.deleted_at.is_none())
        {
            sub.status = SubscriptionStatus::Cancelled;
            sub.active = false;
            sub.updated_at = now;
        }
        Ok(true)
    }
}

#[async_trait]
impl PlanRepository for MemoryStore {
    async fn find_by_id(&self, plan_id: Uuid) -> Res<Option<Plan>> {
        Ok(self
            .state()?
            .plans
            .get(&plan_id)
            .filter(|p| p.deleted_at.is_none())
            .cloned())
    }

    async fn list(&self, limit: i64) -> Res<Vec<Plan>> {
        let state = self.state()?;
        let mut plans: Vec<Plan> = state
            .plans
            .values()
            .filter(|p| p.deleted_at.is_none())
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        plans.truncate(limit.max(0) as usize);
        Ok(plans)
    }

    async fn create(&self, data: PlanCreateRequest) -> Res<Plan> {
        let mut state = self.state()?;
        if state.plans.values().any(|p| p.name == data.name) {
            return Err(AppError::Conflict("Plan name already exists".to_string()));
        }

        let now = Utc::now();
        let plan = Plan {
            id: Uuid::new_v4(),
            name: data.name,
            description: data.description,
            price: data.price,
            duration_days: data.duration_days,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn update(&self, plan_id: Uuid, data: PlanUpdateRequest) -> Res<Option<Plan>> {
        let mut state = self.state()?;
        if let Some(name) = &data.name {
            if state
                .plans
                .values()
                .any(|p| p.id != plan_id && &p.name == name)
            {
                return Err(AppError::Conflict("Plan name already exists".to_string()));
            }
        }

        let Some(plan) = state
            .plans
            .get_mut(&plan_id)
            .filter(|p| p.deleted_at.is_none())
        else {
            return Ok(None);
        };

        if let Some(name) = data.name {
            plan.name = name;
        }
        if let Some(description) = data.description {
            plan.description = Some(description);
        }
        if let Some(price) = data.price {
            plan.price = price;
        }
        if let Some(duration_days) = data.duration_days {
            plan.duration_days = duration_days;
        }
        plan.updated_at = Utc::now();
        Ok(Some(plan.clone()))
    }

    async fn soft_delete(&self, plan_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        let mut state = self.state()?;
        match state
            .plans
            .get_mut(&plan_id)
            .filter(|p| p.deleted_at.is_none())
        {
            Some(plan) => {
                plan.deleted_at = Some(now);
                plan.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn live(sub: &Subscription) -> bool {
    sub.deleted_at.is_none()
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn create(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        let mut state = self.state()?;
        if state
            .subscriptions
            .iter()
            .any(|s| live(s) && s.active && s.user_id == data.user_id)
        {
            return Err(AppError::Conflict(
                "User already has an active subscription".to_string(),
            ));
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            plan_id: data.plan_id,
            status: SubscriptionStatus::Active,
            amount: data.amount,
            start_date: data.start_date,
            expires_at: data.expires_at,
            active: true,
            created_at: data.start_date,
            updated_at: data.start_date,
            deleted_at: None,
        };
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn find_by_id(&self, subscription_id: Uuid) -> Res<Option<Subscription>> {
        Ok(self
            .state()?
            .subscriptions
            .iter()
            .find(|s| s.id == subscription_id && live(s))
            .cloned())
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Res<Option<Subscription>> {
        Ok(self
            .state()?
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.active && live(s))
            .cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        Ok(self
            .state()?
            .subscriptions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id && live(s))
            .cloned()
            .collect())
    }

    async fn update_state(
        &self,
        subscription_id: Uuid,
        update: SubscriptionStateUpdate,
    ) -> Res<Option<Subscription>> {
        let mut state = self.state()?;
        let Some(sub) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id && live(s) && s.status == update.expected_status)
        else {
            return Ok(None);
        };

        sub.status = update.status;
        sub.active = update.status.is_active();
        sub.expires_at = update.expires_at;
        sub.updated_at = update.updated_at;
        Ok(Some(sub.clone()))
    }

    async fn soft_delete(&self, subscription_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        let mut state = self.state()?;
        let Some(sub) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id && live(s))
        else {
            return Ok(false);
        };

        if sub.status.is_active() {
            sub.status = SubscriptionStatus::Cancelled;
        }
        sub.active = false;
        sub.deleted_at = Some(now);
        sub.updated_at = now;
        Ok(true)
    }

    async fn count_and_sum(&self) -> Res<SubscriptionStats> {
        let state = self.state()?;
        let (count, sum) = state
            .subscriptions
            .iter()
            .filter(|s| live(s))
            .fold((0i64, BigDecimal::from(0)), |(count, sum), s| {
                (count + 1, sum + &s.amount)
            });
        Ok(SubscriptionStats {
            total_subscriptions: count,
            total_amount: sum,
        })
    }

    async fn find_page(&self, limit: i64, offset: i64) -> Res<(Vec<Subscription>, i64)> {
        let state = self.state()?;
        let live_subs: Vec<&Subscription> =
            state.subscriptions.iter().rev().filter(|s| live(s)).collect();
        let total = live_subs.len() as i64;
        let items = live_subs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Res<u64> {
        let mut state = self.state()?;
        let mut changed = 0;
        for sub in state
            .subscriptions
            .iter_mut()
            .filter(|s| s.active && s.deleted_at.is_none() && s.expires_at < now)
        {
            sub.status = SubscriptionStatus::Expired;
            sub.active = false;
            sub.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }
}
