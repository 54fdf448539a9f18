use actix_web::{Responder, delete, get, put, web};
use common::{
    error::{AppError, Res},
    http::Success,
    jwt::JwtClaims,
};
use uuid::Uuid;

use crate::{
    dtos::user::{UserListQuery, UserUpdateBody},
    services::{auth::AuthService, user::UserService},
};

#[get("/me")]
async fn get_me(
    claims: web::ReqData<JwtClaims>,
    auth: web::Data<AuthService>,
) -> Res<impl Responder> {
    let user = auth.current_user(claims.sub).await?;
    Success::ok(user)
}

#[get("")]
async fn get_users(
    query: web::Query<UserListQuery>,
    users: web::Data<UserService>,
) -> Res<impl Responder> {
    let users = users.list(query.limit).await?;
    Success::ok(users)
}

#[get("/{id}")]
async fn get_user(path: web::Path<Uuid>, users: web::Data<UserService>) -> Res<impl Responder> {
    let user = users.get(path.into_inner()).await?;
    Success::ok(user)
}

/// Users may only change their own account.
#[put("/{id}")]
async fn put_user(
    path: web::Path<Uuid>,
    req: web::Json<UserUpdateBody>,
    claims: web::ReqData<JwtClaims>,
    users: web::Data<UserService>,
) -> Res<impl Responder> {
    let user_id = own_account(path.into_inner(), &claims)?;
    let user = users.update(user_id, req.into_inner()).await?;
    Success::ok(user)
}

/// Soft-deletes the caller's own account and cancels its active subscription.
#[delete("/{id}")]
async fn delete_user(
    path: web::Path<Uuid>,
    claims: web::ReqData<JwtClaims>,
    users: web::Data<UserService>,
) -> Res<impl Responder> {
    let user_id = own_account(path.into_inner(), &claims)?;
    users.delete(user_id).await?;
    Success::message("User deleted successfully")
}

fn own_account(user_id: Uuid, claims: &JwtClaims) -> Res<Uuid> {
    if user_id == claims.sub {
        Ok(user_id)
    } else {
        Err(AppError::Forbidden(
            "Cannot modify another user's account".to_string(),
        ))
    }
}
