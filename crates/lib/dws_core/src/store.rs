//! Shared persistence error type and the per-call timeout helper.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Default bound on a single database call.
pub const DB_TIMEOUT: Duration = Duration::from_secs(10);

/// Persistence errors shared by every store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated; carries the constraint name.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database call timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".into()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Run a database future under [`DB_TIMEOUT`].
pub async fn timed<T, F>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(DB_TIMEOUT, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout(DB_TIMEOUT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, sqlx::Error>(())
        };
        assert!(matches!(timed(slow).await, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let value = timed(async { Ok::<_, sqlx::Error>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }
}
