use actix_web::{HttpResponse, http::header};
use thiserror::Error;

/// Sent as `Retry-After` on retryable failures.
const RETRY_AFTER_SECS: &str = "1";

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Password hashing error: {0}")]
    Hashing(String),

    // === APPLICATION ERRORS ===
    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Deliberately carries no detail: unknown email and wrong password
    /// must look the same to the caller.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Resource conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => {
                AppError::Timeout("Timed out waiting for a database connection".to_string())
            }
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
                AppError::Conflict(unique_violation_message(db_error.constraint()))
            }
            other => AppError::Database(other),
        }
    }
}

fn unique_violation_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("users_email_key") => "Email already registered".to_string(),
        Some("plans_name_key") => "Plan name already exists".to_string(),
        Some("subscriptions_one_active_per_user") => {
            "User already has an active subscription".to_string()
        }
        Some(other) => format!("Unique constraint violated: {}", other),
        None => "Unique constraint violated".to_string(),
    }
}

impl AppError {
    /// Whether the caller may retry the same request later without changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::TooManyRequests(_) | AppError::Timeout(_) | AppError::Unavailable(_)
        )
    }

    pub fn to_http_response(&self) -> HttpResponse {
        let mut response = self.status_response();
        if self.is_retryable() {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                header::HeaderValue::from_static(RETRY_AFTER_SECS),
            );
        }
        response
    }

    fn status_response(&self) -> HttpResponse {
        let is_dev = cfg!(debug_assertions);

        let to_internal_json = |err_msg: &str| {
            if is_dev {
                serde_json::json!({ "error": err_msg })
            } else {
                serde_json::json!({ "error": "Internal server error" })
            }
        };

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                log::error!("Database error: {}", error);
                HttpResponse::ServiceUnavailable().json(to_internal_json(&error.to_string()))
            }
            AppError::Hashing(error) => {
                log::error!("Password hashing error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(error))
            }

            // === APPLICATION ERRORS ===
            AppError::Unauthorized(_) | AppError::InvalidCredentials => {
                HttpResponse::Unauthorized().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::Forbidden(_) => {
                HttpResponse::Forbidden().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::Conflict(_) => {
                HttpResponse::Conflict().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::NotFound(_) => {
                HttpResponse::NotFound().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::BadRequest(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::TooManyRequests(_) => HttpResponse::TooManyRequests()
                .json(serde_json::json!({ "error": self.to_string() })),
            AppError::Unavailable(error) => {
                log::error!("Unavailable: {}", error);
                HttpResponse::ServiceUnavailable().json(to_internal_json(&self.to_string()))
            }
            AppError::Timeout(error) => {
                log::warn!("Timeout: {}", error);
                HttpResponse::GatewayTimeout()
                    .json(serde_json::json!({ "error": self.to_string() }))
            }

            AppError::Config(error) | AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(error))
            }
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;

    use super::*;

    #[test]
    fn pool_timeout_is_a_distinct_kind() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn other_sqlx_errors_stay_database_errors() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Database(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::TooManyRequests("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (AppError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (AppError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(err.to_http_response().status(), status, "{err}");
        }
    }

    #[test]
    fn retryable_failures_carry_retry_after() {
        let throttled = AppError::TooManyRequests("x".into()).to_http_response();
        assert_eq!(
            throttled.headers().get(header::RETRY_AFTER).unwrap(),
            RETRY_AFTER_SECS
        );

        let conflict = AppError::Conflict("x".into()).to_http_response();
        assert!(conflict.headers().get(header::RETRY_AFTER).is_none());
    }
}
