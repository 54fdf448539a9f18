use bigdecimal::BigDecimal;

pub struct PlanCreateRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub duration_days: i32,
}

/// Fields left as `None` keep their stored value.
#[derive(Default)]
pub struct PlanUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<BigDecimal>,
    pub duration_days: Option<i32>,
}
