use actix_web::{Responder, post, web};
use common::error::Res;
use common::http::Success;
use serde::Deserialize;

use crate::dtos::auth::{LoginRequest, RegisterRequest};
use crate::services::auth::AuthService;

/// Registers a new user and returns its first token pair with 201 Created.
///
/// 400 on malformed fields, 409 when the email is taken, 429 when token
/// issuance is saturated (the account exists; log in to get tokens).
#[post("/register")]
async fn post_register(
    req: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Res<impl Responder> {
    let req = req.into_inner();
    req.validate()?;
    let tokens = auth.register(&req.name, &req.email, &req.password).await?;
    Success::created(tokens)
}

/// Authenticates with email and password.
///
/// Unknown email and wrong password give the same 401.
#[post("/login")]
async fn post_login(
    req: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Res<impl Responder> {
    let req = req.into_inner();
    req.validate()?;
    let tokens = auth.login(&req.email, &req.password).await?;
    Success::ok(tokens)
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[post("/refresh")]
async fn post_refresh(
    req: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Res<impl Responder> {
    let tokens = auth.refresh(&req.refresh_token).await?;
    Success::ok(tokens)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, http::StatusCode, test, web};
    use common::jwt::TokenPair;
    use db::memory::MemoryStore;
    use serde_json::json;

    use crate::{auth_middleware, mount_auth, mount_user, services::auth::tests::service};

    #[actix_web::test]
    async fn register_login_and_me() {
        let (auth, issuer) = service(Arc::new(MemoryStore::new()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(auth))
                .service(mount_auth())
                .service(mount_user().wrap(auth_middleware(issuer))),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({ "name": "Ann", "email": "ann@x.io", "password": "password1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "email": "ann@x.io", "password": "password1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let tokens: TokenPair = test::read_body_json(resp).await;

        let req = test::TestRequest::get()
            .uri("/users/me")
            .insert_header(("Authorization", format!("Bearer {}", tokens.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let me: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(me["email"], "ann@x.io");
        assert!(me.get("password_hash").is_none());
    }

    #[actix_web::test]
    async fn bad_login_and_missing_token_are_unauthorized() {
        let (auth, issuer) = service(Arc::new(MemoryStore::new()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(auth))
                .service(mount_auth())
                .service(mount_user().wrap(auth_middleware(issuer))),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "email": "nobody@x.io", "password": "password1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get().uri("/users/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn malformed_registration_is_rejected() {
        let (auth, _) = service(Arc::new(MemoryStore::new()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(auth))
                .service(mount_auth()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({ "name": "Ann", "email": "ann@x.io", "password": "short" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
