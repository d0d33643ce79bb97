//! Application services implementing the CRUD contract on top of the
//! repository ports.
//!
//! Each store is generic over its repository, id generator and clock, and
//! runs every backend call under a bounded wait. Giving up on a call (timeout
//! or dropping the future) does not cancel work the backend already started:
//! a write may still land after the caller stopped waiting.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::StoreError;

mod installation;
mod tag;
mod upgrade;

pub use installation::InstallationStore;
pub use tag::TagStore;
pub use upgrade::UpgradeStore;

/// Per-operation wait applied when a store is built without an explicit one.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `fut`, failing with `StoreError::Timeout` once `limit` elapses.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    op: &'static str,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => {
            warn!(op, timeout_ms = limit.as_millis() as u64, "store operation timed out");
            Err(StoreError::Timeout(limit))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_passes_through_results() {
        let ok = bounded(Duration::from_secs(1), "noop", async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = bounded(Duration::from_secs(1), "noop", async {
            Err::<(), _>(StoreError::Storage("down".into()))
        })
        .await;
        assert!(matches!(err, Err(StoreError::Storage(_))));
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let limit = Duration::from_millis(20);
        let res = bounded(limit, "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;
        assert!(matches!(res, Err(StoreError::Timeout(d)) if d == limit));
    }
}
