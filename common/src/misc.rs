use std::{future::Future, time::Duration};

use crate::error::{AppError, Res};

/// Runs a storage call under `deadline`.
///
/// Elapsing is reported as `AppError::Timeout` so callers can tell a slow
/// datastore apart from a failing one.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Res<T>
where
    F: Future<Output = Res<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(format!(
            "storage call exceeded {} ms",
            deadline.as_millis()
        ))),
    }
}

/// Ceiling division used for page counts. `per_page` must be positive.
pub fn total_pages(total: i64, per_page: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}
