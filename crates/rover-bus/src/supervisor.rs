// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Restart wrapper for long-running tasks.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

/// Run `task` until it returns `Ok`.
///
/// Each attempt runs on its own tokio task so that a panic is contained. On
/// `Err` or panic the failure is logged, the supervisor sleeps
/// `restart_delay` and starts a fresh attempt. Cancellation of the attempt
/// (runtime shutdown) ends supervision.
pub async fn supervise<F, Fut, E>(name: &str, restart_delay: Duration, mut task: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match tokio::spawn(task()).await {
            Ok(Ok(())) => {
                info!(task = name, attempt, "task finished");
                return;
            }
            Ok(Err(e)) => {
                error!(task = name, attempt, error = %e, "task failed");
            }
            Err(join) if join.is_panic() => {
                error!(task = name, attempt, "task panicked");
            }
            Err(_) => {
                info!(task = name, "task cancelled");
                return;
            }
        }
        info!(task = name, delay_ms = restart_delay.as_millis() as u64, "restarting task");
        tokio::time::sleep(restart_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_error() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        supervise("flaky", Duration::from_secs(5), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("boom")
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_panic() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        supervise("panicky", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first attempt");
                }
                Ok::<(), String>(())
            }
        })
        .await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
