use bigdecimal::BigDecimal;
use db::dtos::plan::{PlanCreateRequest, PlanUpdateRequest};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PlanCreateBody {
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub duration_days: i32,
}

impl From<PlanCreateBody> for PlanCreateRequest {
    fn from(body: PlanCreateBody) -> Self {
        PlanCreateRequest {
            name: body.name.trim().to_string(),
            description: body.description,
            price: body.price,
            duration_days: body.duration_days,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanUpdateBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<BigDecimal>,
    pub duration_days: Option<i32>,
}

impl From<PlanUpdateBody> for PlanUpdateRequest {
    fn from(body: PlanUpdateBody) -> Self {
        PlanUpdateRequest {
            name: body.name.map(|name| name.trim().to_string()),
            description: body.description,
            price: body.price,
            duration_days: body.duration_days,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlanListQuery {
    pub limit: Option<i64>,
}
