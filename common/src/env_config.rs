use std::{env, str::FromStr, sync::Arc, time::Duration};

use crate::error::{AppError, Res};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Holds everything the initialization sequence needs: database connection,
/// credential signing, server binding, logging, and the limits the
/// subscription registry applies.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// Configuration for JWT (JSON Web Token) issuance.
    pub jwt_config: JwtConfig,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Upper bound for the page size of subscription listings.
    pub max_page_size: i64,
    /// Deadline applied to every storage call made by the services.
    pub storage_timeout: Duration,
}

#[derive(Clone, Debug)]
/// Configuration for JSON Web Token (JWT) issuance.
///
/// The secret is loaded once at startup; rotating it invalidates every
/// token issued before.
pub struct JwtConfig {
    /// The secret key used to sign and verify JWTs.
    pub secret: String,
    /// Lifetime of access tokens in hours.
    pub access_ttl_hours: i64,
    /// Lifetime of refresh tokens in hours.
    pub refresh_ttl_hours: i64,
    /// Maximum number of token issuances allowed in flight at once.
    pub issuance_capacity: usize,
}

impl JwtConfig {
    /// Reads the JWT configuration through `lookup`:
    /// - `JWT_SECRET`: Required, must not be empty.
    /// - `JWT_ACCESS_TTL_HOURS`: Optional. Defaults to 24.
    /// - `JWT_REFRESH_TTL_HOURS`: Optional. Defaults to 168 (7 days).
    /// - `JWT_ISSUANCE_CAPACITY`: Optional. Defaults to 1000.
    pub fn from_lookup<F>(lookup: &F) -> Res<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = required(lookup, "JWT_SECRET")?;
        if secret.trim().is_empty() {
            return Err(AppError::Config("JWT_SECRET must not be empty".to_string()));
        }

        let config = JwtConfig {
            secret,
            access_ttl_hours: parsed_or(lookup, "JWT_ACCESS_TTL_HOURS", 24)?,
            refresh_ttl_hours: parsed_or(lookup, "JWT_REFRESH_TTL_HOURS", 24 * 7)?,
            issuance_capacity: parsed_or(lookup, "JWT_ISSUANCE_CAPACITY", 1000)?,
        };

        if config.access_ttl_hours <= 0 || config.refresh_ttl_hours <= 0 {
            return Err(AppError::Config(
                "JWT token lifetimes must be positive".to_string(),
            ));
        }
        if config.issuance_capacity == 0 {
            return Err(AppError::Config(
                "JWT_ISSUANCE_CAPACITY must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// Loads `.env` first (if present), then reads the process environment.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `DATABASE_URL`: Connection string for the database
    /// - `JWT_SECRET`: Secret key for JWT signing
    ///
    /// Optional (with defaults):
    /// - `ENVIRONMENT`: "development" or "production" (default: "development")
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 8080)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `MAX_PAGE_SIZE`: Page size clamp for listings (default: 100)
    /// - `STORAGE_TIMEOUT_SECS`: Storage call deadline (default: 5)
    /// - JWT settings, see [`JwtConfig::from_lookup`]
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// numeric value cannot be parsed, so the server never starts half
    /// configured.
    pub fn from_env() -> Res<Arc<Self>> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok()).map(Arc::new)
    }

    pub fn from_lookup<F>(lookup: F) -> Res<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            database_url: required(&lookup, "DATABASE_URL")?,
            jwt_config: JwtConfig::from_lookup(&lookup)?,
            server_host: lookup("IP").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parsed_or(&lookup, "PORT", 8080)?,
            num_workers: parsed_or(&lookup, "WORKERS", 4)?,
            console_logging_enabled: lookup("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|| "true".to_string())
                .to_lowercase()
                == "true",
            max_page_size: parsed_or::<_, i64>(&lookup, "MAX_PAGE_SIZE", 100)?.max(1),
            storage_timeout: Duration::from_secs(parsed_or(&lookup, "STORAGE_TIMEOUT_SECS", 5)?),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn required<F>(lookup: &F, key: &str) -> Res<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| AppError::Config(format!("{} must be set", key)))
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> Res<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid number", key))),
        None => Ok(default),
    }
}
