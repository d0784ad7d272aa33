//! Fixed retry for idempotent reads.

use std::future::Future;

use tracing::debug;

use crate::config::ReadRetry;
use crate::error::SyncResult;

impl ReadRetry {
    /// Run `op`, retrying up to `self.retries` more times after a fixed delay.
    ///
    /// Reads only. Writes are never passed through here.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let attempts = self.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    debug!(
                        "{} failed (attempt {}/{}): {}",
                        what, attempt, attempts, err
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
