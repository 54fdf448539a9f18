use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::subscription::SubscriptionStatus;

/// A new subscription always starts out active.
pub struct SubscriptionCreateRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount: BigDecimal,
    pub start_date: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Full target state for an existing subscription. `active` is derived from
/// `status` by the repository.
pub struct SubscriptionStateUpdate {
    /// Status the record must still have for the write to apply.
    pub expected_status: SubscriptionStatus,
    pub status: SubscriptionStatus,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
