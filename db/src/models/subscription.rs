use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn is_active(self) -> bool {
        self == SubscriptionStatus::Active
    }

    /// `active` may move to either terminal state; terminal states never move.
    pub fn can_transition_to(self, next: SubscriptionStatus) -> bool {
        self == next || (self == SubscriptionStatus::Active && next != SubscriptionStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    /// Plan price at the time of subscribing.
    pub amount: BigDecimal,
    pub start_date: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Status as observed at `now`. An active record past its expiry reads as
    /// expired even before a sweep has written that down.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        if self.status.is_active() && self.is_expired_at(now) {
            SubscriptionStatus::Expired
        } else {
            self.status
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SubscriptionStats {
    pub total_subscriptions: i64,
    pub total_amount: BigDecimal,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn only_active_can_leave_its_state() {
        use SubscriptionStatus::*;
        assert!(Active.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Expired));
        assert!(Active.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Cancelled));
        assert!(Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn expiry_is_a_read_time_fact() {
        let start = Utc::now();
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            status: SubscriptionStatus::Active,
            amount: BigDecimal::from(10),
            start_date: start,
            expires_at: start + Duration::days(30),
            active: true,
            created_at: start,
            updated_at: start,
            deleted_at: None,
        };

        assert_eq!(sub.effective_status(start), SubscriptionStatus::Active);
        assert_eq!(
            sub.effective_status(start + Duration::days(31)),
            SubscriptionStatus::Expired
        );
        // the stored record is untouched
        assert!(sub.active);
    }
}
