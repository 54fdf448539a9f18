use actix_web::{HttpResponse, Responder, delete, get, post, put, web};
use common::{
    error::{AppError, Res},
    http::Success,
    jwt::JwtClaims,
};
use uuid::Uuid;

use crate::dtos::sub::{PageQuery, SubscribeRequest, SubscriptionPatch, SweepResponse};
use crate::services::sub::SubscriptionRegistry;

/// Subscribes the caller to a plan. A `user_id`, when given, must be the
/// caller's own.
///
/// 201 with the new subscription, 403 for another user's id, 404 for an
/// unknown user or plan, 409 when the user already has an active subscription.
#[post("/subscribe")]
async fn post_subscribe(
    req: web::Json<SubscribeRequest>,
    claims: web::ReqData<JwtClaims>,
    registry: web::Data<SubscriptionRegistry>,
) -> Res<impl Responder> {
    let user_id = match req.user_id {
        Some(user_id) if user_id != claims.sub => {
            return Err(AppError::Forbidden(
                "Cannot subscribe on behalf of another user".to_string(),
            ));
        }
        _ => claims.sub,
    };
    let subscription = registry.subscribe(user_id, req.plan_id).await?;
    Success::created(subscription)
}

#[get("")]
async fn get_subscriptions(
    query: web::Query<PageQuery>,
    registry: web::Data<SubscriptionRegistry>,
) -> Res<impl Responder> {
    let page = registry
        .list_page(query.page.unwrap_or(1), query.limit.unwrap_or(0))
        .await?;
    Success::ok(page)
}

#[get("/stats")]
async fn get_stats(registry: web::Data<SubscriptionRegistry>) -> Res<impl Responder> {
    Success::ok(registry.stats().await?)
}

/// Writes down lapsed expiries. Never triggered automatically.
#[post("/sweep")]
async fn post_sweep(registry: web::Data<SubscriptionRegistry>) -> Res<impl Responder> {
    let expired = registry.expire_due().await?;
    Success::ok(SweepResponse { expired })
}

#[get("/{id}")]
async fn get_subscription(
    path: web::Path<Uuid>,
    registry: web::Data<SubscriptionRegistry>,
) -> Res<impl Responder> {
    Success::ok(registry.get(path.into_inner()).await?)
}

#[put("/{id}")]
async fn put_subscription(
    path: web::Path<Uuid>,
    patch: web::Json<SubscriptionPatch>,
    registry: web::Data<SubscriptionRegistry>,
) -> Res<impl Responder> {
    let subscription = registry
        .update(path.into_inner(), patch.into_inner())
        .await?;
    Success::ok(subscription)
}

#[delete("/{id}")]
async fn delete_subscription(
    path: web::Path<Uuid>,
    claims: web::ReqData<JwtClaims>,
    registry: web::Data<SubscriptionRegistry>,
) -> Res<impl Responder> {
    let id = path.into_inner();
    ensure_owner(&registry, id, &claims).await?;
    registry.delete(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/{id}/cancel")]
async fn post_cancel(
    path: web::Path<Uuid>,
    claims: web::ReqData<JwtClaims>,
    registry: web::Data<SubscriptionRegistry>,
) -> Res<impl Responder> {
    let id = path.into_inner();
    ensure_owner(&registry, id, &claims).await?;
    Success::ok(registry.cancel(id).await?)
}

async fn ensure_owner(
    registry: &SubscriptionRegistry,
    subscription_id: Uuid,
    claims: &JwtClaims,
) -> Res<()> {
    if registry.get(subscription_id).await?.user_id == claims.sub {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Subscription belongs to another user".to_string(),
        ))
    }
}

/// Mounted under `/users`.
#[get("/{id}/subscriptions")]
async fn get_user_subscriptions(
    path: web::Path<Uuid>,
    registry: web::Data<SubscriptionRegistry>,
) -> Res<impl Responder> {
    Success::ok(registry.list_by_user(path.into_inner()).await?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, HttpMessage, dev::Service, http::StatusCode, test};
    use common::jwt::{JwtClaims, TokenKind};
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        mount_subs,
        services::sub::tests::{fixture, plan, user},
    };

    fn claims(user_id: Uuid) -> JwtClaims {
        JwtClaims {
            sub: user_id,
            kind: TokenKind::Access,
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[actix_web::test]
    async fn subscribe_cancel_and_resubscribe_over_http() {
        let f = fixture();
        let ann = user(&f.store, "ann@x.io").await;
        let monthly = plan(&f.store, "Monthly", "9.99", 30).await;
        let yearly = plan(&f.store, "Yearly", "99.00", 365).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(f.registry.clone()))
                .wrap_fn(move |req, srv| {
                    req.extensions_mut().insert(claims(ann));
                    srv.call(req)
                })
                .service(mount_subs()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/subscriptions/subscribe")
            .set_json(json!({ "plan_id": monthly.id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let first: Value = test::read_body_json(resp).await;
        assert_eq!(first["status"], "active");
        assert_eq!(first["user_id"], json!(ann));

        let req = test::TestRequest::post()
            .uri("/subscriptions/subscribe")
            .set_json(json!({ "plan_id": yearly.id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let id = first["id"].as_str().unwrap();
        let req = test::TestRequest::post()
            .uri(&format!("/subscriptions/{}/cancel", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/subscriptions/subscribe")
            .set_json(json!({ "plan_id": yearly.id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::get()
            .uri("/subscriptions?page=1&limit=1000")
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["per_page"], 100);
        assert_eq!(page["total"], 2);

        let req = test::TestRequest::get().uri("/subscriptions/stats").to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["total_subscriptions"], 2);
    }

    #[actix_web::test]
    async fn unknown_subscription_is_not_found() {
        let f = fixture();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(Arc::clone(&f.registry)))
                .wrap_fn(|req, srv| {
                    req.extensions_mut().insert(claims(Uuid::new_v4()));
                    srv.call(req)
                })
                .service(mount_subs()),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/subscriptions/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::delete()
            .uri(&format!("/subscriptions/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn only_the_owner_may_cancel_or_delete() {
        let f = fixture();
        let ann = user(&f.store, "ann@x.io").await;
        let bob = user(&f.store, "bob@x.io").await;
        let monthly = plan(&f.store, "Monthly", "9.99", 30).await;
        let owned = f.registry.subscribe(ann, monthly.id).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(f.registry.clone()))
                .wrap_fn(move |req, srv| {
                    req.extensions_mut().insert(claims(bob));
                    srv.call(req)
                })
                .service(mount_subs()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/subscriptions/{}/cancel", owned.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete()
            .uri(&format!("/subscriptions/{}", owned.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/subscriptions/subscribe")
            .set_json(json!({ "plan_id": monthly.id, "user_id": ann }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        assert!(f.registry.get(owned.id).await.unwrap().active);
    }
}
