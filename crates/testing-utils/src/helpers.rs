//! Test helper utilities and common testing patterns

use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Test environment utilities
///
/// Uses tokio's clock so the helpers also work under `start_paused = true`.
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        condition()
    }

    /// Let detached tasks (miss-writes, opening messages) run to completion
    pub async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }
}
