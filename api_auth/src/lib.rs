use std::sync::Arc;

use actix_web::{Scope, web};
use common::jwt::TokenIssuer;
use middleware::auth::AuthMiddleware;

pub mod middleware {
    pub mod auth;
}
pub mod dtos {
    pub mod auth;
    pub mod user;
}
pub mod services {
    pub mod auth;
    pub mod password;
    pub mod user;
}
mod routes {
    pub mod auth;
    pub mod user;
}

pub use services::{auth::AuthService, password::PasswordVerifier, user::UserService};

pub fn mount_auth() -> Scope {
    web::scope("/auth")
        .service(routes::auth::post_register)
        .service(routes::auth::post_login)
        .service(routes::auth::post_refresh)
}

/// Bearer-protected. Other crates may add their `/users/...` routes to the
/// returned scope before it is wrapped.
pub fn mount_user() -> Scope {
    web::scope("/users")
        .service(routes::user::get_me)
        .service(routes::user::get_users)
        .service(routes::user::get_user)
        .service(routes::user::put_user)
        .service(routes::user::delete_user)
}

pub fn auth_middleware(issuer: Arc<TokenIssuer>) -> AuthMiddleware {
    AuthMiddleware::new(issuer)
}
