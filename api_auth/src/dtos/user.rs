use common::error::{AppError, Res};
use serde::Deserialize;

use crate::dtos::auth::validate_email;

pub const MAX_USER_LIST: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdateBody {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserUpdateBody {
    pub fn validate(&self) -> Res<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::BadRequest("Name must not be empty".to_string()));
            }
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub limit: Option<i64>,
}
