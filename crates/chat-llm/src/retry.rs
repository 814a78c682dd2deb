//! Exponential backoff for recoverable provider errors: up to three
//! attempts total, sleeping 1s then 2s between them, capped at 4s.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ProviderError;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(4);

pub async fn with_retry<T, F, Fut>(op_name: &str, mut f: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.recoverable() && attempt < MAX_ATTEMPTS => {
                let delay = BASE_DELAY.saturating_mul(1 << (attempt - 1)).min(MAX_DELAY);
                warn!(op = op_name, attempt, ?delay, error = %err, "retrying recoverable provider error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
