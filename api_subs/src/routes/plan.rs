use actix_web::{HttpResponse, Responder, delete, get, post, put, web};
use common::{error::Res, http::Success};
use uuid::Uuid;

use crate::dtos::plan::{PlanCreateBody, PlanListQuery, PlanUpdateBody};
use crate::services::plan::PlanCatalog;

#[get("")]
async fn get_plans(
    query: web::Query<PlanListQuery>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    Success::ok(catalog.list(query.limit).await?)
}

#[get("/{id}")]
async fn get_plan(
    path: web::Path<Uuid>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    Success::ok(catalog.get(path.into_inner()).await?)
}

/// 400 for a negative price or a non-positive duration, 409 for a taken name.
#[post("")]
async fn post_plan(
    body: web::Json<PlanCreateBody>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    let plan = catalog.create(body.into_inner().into()).await?;
    Success::created(plan)
}

#[put("/{id}")]
async fn put_plan(
    path: web::Path<Uuid>,
    body: web::Json<PlanUpdateBody>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    let plan = catalog
        .update(path.into_inner(), body.into_inner().into())
        .await?;
    Success::ok(plan)
}

#[delete("/{id}")]
async fn delete_plan(
    path: web::Path<Uuid>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    catalog.delete(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
