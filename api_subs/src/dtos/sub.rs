use chrono::{DateTime, Utc};
use db::models::subscription::SubscriptionStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan_id: Uuid,
    /// Defaults to the authenticated user.
    pub user_id: Option<Uuid>,
}

/// Administrative edit; absent fields stay as they are.
#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionPatch {
    pub status: Option<SubscriptionStatus>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired: u64,
}
