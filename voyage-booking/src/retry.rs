use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::repository::{StoreError, StoreResult};

const BASE_DELAY: Duration = Duration::from_millis(10);

/// Run a unit of work, retrying up to `max_retries` times on store conflicts.
///
/// `attempt` is invoked once per try so it can rebuild its input (a fresh booking reference
/// after a collision, for instance). Any other error is returned immediately.
pub async fn retry_on_conflict<T, F, Fut>(max_retries: u32, operation: &str, mut attempt: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(StoreError::Conflict(reason)) if retries < max_retries => {
                retries += 1;
                warn!("{} hit a transaction conflict ({}), retry {}/{}", operation, reason, retries, max_retries);
                sleep(BASE_DELAY * retries).await;
            }
            Err(StoreError::ReferenceTaken(reference)) if retries < max_retries => {
                retries += 1;
                warn!("{} collided on booking reference {}, regenerating", operation, reference);
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReservationError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_conflicts_are_retried_within_budget() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(3, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Conflict("serialization failure".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_conflict() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = retry_on_conflict(3, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Conflict("deadlock".to_string())) }
        })
        .await;

        assert_eq!(
            ReservationError::from(result.unwrap_err()),
            ReservationError::TransactionConflict
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_business_rejections_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = retry_on_conflict(3, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Rejected(ReservationError::TransactionConflict)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
