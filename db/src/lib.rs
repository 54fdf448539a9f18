use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
};
use std::{str::FromStr, sync::Arc, time::Duration};

pub mod memory;
pub mod plan;
pub mod subscription;
pub mod user;

pub mod models {
    pub mod plan;
    pub mod subscription;
    pub mod user;
}

pub mod dtos {
    pub mod plan;
    pub mod subscription;
    pub mod user;
}

/// Connects to PostgreSQL, creating the database if it does not exist yet,
/// and runs the migrations.
///
/// `acquire_timeout` bounds how long a storage call may wait for a pooled
/// connection.
pub async fn setup(
    database_url: &str,
    require_ssl: bool,
    acquire_timeout: Duration,
) -> Result<Arc<PgPool>, Box<dyn std::error::Error>> {
    let url = url::Url::parse(database_url)?;
    let db_name = url.path().trim_start_matches('/');
    let username = url.username();
    let password = url.password().unwrap_or("");
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(5432);

    let admin_url = format!(
        "postgresql://{}:{}@{}:{}/postgres",
        username, password, host, port
    );

    let mut admin_options = PgConnectOptions::from_str(&admin_url)?;
    if require_ssl {
        admin_options = admin_options.ssl_mode(PgSslMode::Require);
    }

    let admin_pool = PgPool::connect_with(admin_options).await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&admin_pool)
            .await?;

    if !exists {
        log::info!("Creating database {}", db_name);
        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&admin_pool)
            .await?;
    }

    admin_pool.close().await;

    let mut options = PgConnectOptions::from_str(database_url)?;
    if require_ssl {
        options = options.ssl_mode(PgSslMode::Require);
    }
    let pool = PgPoolOptions::new()
        .max_connections(100)
        .acquire_timeout(acquire_timeout)
        .max_lifetime(Duration::from_secs(60 * 60))
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    log::info!("Connected to database, migrations applied");

    Ok(Arc::new(pool))
}
