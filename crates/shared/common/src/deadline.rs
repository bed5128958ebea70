//! Bounded deadlines for RPC handlers and the I/O they perform.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Run `fut` under `limit`. Expiry becomes [`AppError::Timeout`].
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "Operation exceeded deadline");
            Err(AppError::Timeout)
        }
    }
}
