use actix_web::{Scope, web};

pub mod dtos {
    pub mod plan;
    pub mod sub;
}
pub mod services {
    pub mod plan;
    pub mod sub;
}
mod routes {
    pub mod plan;
    pub mod sub;
}

pub use services::{plan::PlanCatalog, sub::SubscriptionRegistry};

/// Expects `JwtClaims` in the request extensions.
pub fn mount_subs() -> Scope {
    web::scope("/subscriptions")
        .service(routes::sub::post_subscribe)
        .service(routes::sub::get_subscriptions)
        .service(routes::sub::get_stats)
        .service(routes::sub::post_sweep)
        .service(routes::sub::get_subscription)
        .service(routes::sub::put_subscription)
        .service(routes::sub::delete_subscription)
        .service(routes::sub::post_cancel)
}

pub fn mount_plans() -> Scope {
    web::scope("/plans")
        .service(routes::plan::get_plans)
        .service(routes::plan::get_plan)
        .service(routes::plan::post_plan)
        .service(routes::plan::put_plan)
        .service(routes::plan::delete_plan)
}

/// Adds the per-user subscription listing to the `/users` scope.
pub fn mount_user_subscriptions(users: Scope) -> Scope {
    users.service(routes::sub::get_user_subscriptions)
}
