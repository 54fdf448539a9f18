mod state;

use std::sync::Arc;

use actix_web::{App, HttpServer, Responder, get, web};
use common::{clock::SystemClock, env_config::Config, http::Success};
use state::AppState;

#[get("/ping")]
async fn ping() -> impl Responder {
    Success::message("pong")
}

/// Mounts the API. Everything except auth and plan reads needs a bearer token.
fn api(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.app_data(web::Data::from(state.auth.clone()))
        .app_data(web::Data::from(state.registry.clone()))
        .app_data(web::Data::from(state.catalog.clone()))
        .app_data(web::Data::from(state.users.clone()))
        .service(ping)
        .service(
            web::scope("/api/v1")
                .service(api_auth::mount_auth())
                .service(
                    api_subs::mount_plans()
                        .wrap(api_auth::auth_middleware(state.issuer.clone()).public_reads()),
                )
                .service(
                    api_subs::mount_user_subscriptions(api_auth::mount_user())
                        .wrap(api_auth::auth_middleware(state.issuer.clone())),
                )
                .service(
                    api_subs::mount_subs().wrap(api_auth::auth_middleware(state.issuer.clone())),
                ),
        );
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env().expect("Failed to load configuration");

    let level = if config.is_production() {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Debug
    };
    logger::setup(level, None).expect("Failed to set up logger");

    // init db connection
    let pool = db::setup(
        &config.database_url,
        config.is_production(),
        config.storage_timeout,
    )
    .await
    .expect("Failed to set up database");

    let state = AppState::postgres(&config, pool, Arc::new(SystemClock))
        .expect("Failed to initialize services");
    let console_logging_enabled = config.console_logging_enabled;

    log::info!(
        "Listening on {}:{} with {} workers",
        config.server_host,
        config.server_port,
        config.num_workers
    );

    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(logger::middleware(console_logging_enabled))
            .configure(|cfg| api(cfg, &state))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use actix_web::{App, http::StatusCode, test};
    use api_auth::PasswordVerifier;
    use chrono::{DateTime, TimeDelta, Utc};
    use common::jwt::TokenPair;
    use db::memory::MemoryStore;
    use serde_json::{Value, json};

    use super::*;

    fn test_state() -> AppState {
        let vars = HashMap::from([
            ("DATABASE_URL", "postgres://unused"),
            ("JWT_SECRET", "integration-secret"),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        let store = Arc::new(MemoryStore::new());
        AppState::build(
            &config,
            Arc::new(SystemClock),
            store.clone(),
            store.clone(),
            store,
            PasswordVerifier::with_params(256, 1, 1).unwrap(),
        )
        .unwrap()
    }

    fn bearer(tokens: &TokenPair) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", tokens.access_token))
    }

    fn timestamp(value: &Value) -> DateTime<Utc> {
        value.as_str().unwrap().parse().unwrap()
    }

    #[actix_web::test]
    async fn ping_answers_pong() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|cfg| api(cfg, &state))).await;

        let req = test::TestRequest::get().uri("/ping").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "message": "pong" }));
    }

    #[actix_web::test]
    async fn register_subscribe_cancel_resubscribe() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|cfg| api(cfg, &state))).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(json!({ "name": "Ann", "email": "ann@x.com", "password": "password1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let tokens: TokenPair = test::read_body_json(resp).await;
        let in_a_day = (Utc::now() + TimeDelta::hours(24)).timestamp();
        assert!((tokens.expires_at - in_a_day).abs() < 60);

        // plan reads are public, writes are not
        let req = test::TestRequest::post()
            .uri("/api/v1/plans")
            .set_json(json!({ "name": "Monthly", "price": "9.99", "duration_days": 30 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let mut plan_ids = Vec::new();
        for (name, price, days) in [("Monthly", "9.99", 30), ("Yearly", "99.00", 365)] {
            let req = test::TestRequest::post()
                .uri("/api/v1/plans")
                .insert_header(bearer(&tokens))
                .set_json(json!({ "name": name, "price": price, "duration_days": days }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
            let plan: Value = test::read_body_json(resp).await;
            plan_ids.push(plan["id"].clone());
        }

        let req = test::TestRequest::get().uri("/api/v1/plans").to_request();
        let plans: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(plans.len(), 2);

        let req = test::TestRequest::post()
            .uri("/api/v1/subscriptions/subscribe")
            .insert_header(bearer(&tokens))
            .set_json(json!({ "plan_id": plan_ids[0] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let first: Value = test::read_body_json(resp).await;
        assert_eq!(first["status"], "active");
        assert_eq!(
            timestamp(&first["expires_at"]) - timestamp(&first["start_date"]),
            TimeDelta::days(30)
        );

        let req = test::TestRequest::post()
            .uri("/api/v1/subscriptions/subscribe")
            .insert_header(bearer(&tokens))
            .set_json(json!({ "plan_id": plan_ids[1] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri(&format!(
                "/api/v1/subscriptions/{}/cancel",
                first["id"].as_str().unwrap()
            ))
            .insert_header(bearer(&tokens))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/v1/subscriptions/subscribe")
            .insert_header(bearer(&tokens))
            .set_json(json!({ "plan_id": plan_ids[1] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let second: Value = test::read_body_json(resp).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/users/me")
            .insert_header(bearer(&tokens))
            .to_request();
        let me: Value = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/users/{}/subscriptions",
                me["id"].as_str().unwrap()
            ))
            .insert_header(bearer(&tokens))
            .to_request();
        let history: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(history.len(), 2);

        let req = test::TestRequest::get()
            .uri("/api/v1/subscriptions/stats")
            .insert_header(bearer(&tokens))
            .to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["total_subscriptions"], 2);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/users/{}", me["id"].as_str().unwrap()))
            .insert_header(bearer(&tokens))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "User deleted successfully");

        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/subscriptions/{}",
                second["id"].as_str().unwrap()
            ))
            .insert_header(bearer(&tokens))
            .to_request();
        let after: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(after["status"], "cancelled");
    }

    #[actix_web::test]
    async fn subscriptions_need_a_token() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|cfg| api(cfg, &state))).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/subscriptions")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
