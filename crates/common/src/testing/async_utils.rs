//! Async test helpers

use std::future::Future;
use std::time::Duration;

/// Poll an async condition until it returns true or `timeout` elapses.
///
/// Returns whether the condition was observed true. Useful for waiting on
/// background work such as the cache sweeper.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    condition().await
}
