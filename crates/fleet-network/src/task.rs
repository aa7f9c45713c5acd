//! Cancellable background loops

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a spawned background loop
///
/// Dropping the handle does not stop the loop; call [`BackgroundTask::shutdown`].
pub struct BackgroundTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `f` with a fresh cancellation token
    pub fn spawn<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(f(cancel.clone()));
        debug!(task = name, "Background task started");
        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cancel the loop and wait up to `timeout` for it to exit.
    ///
    /// Returns `false` if the loop had to be aborted.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.cancel.cancel();

        let abort = self.handle.abort_handle();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => {
                info!(task = self.name, "Background task stopped");
                true
            }
            Ok(Err(e)) => {
                warn!(task = self.name, error = %e, "Background task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    task = self.name,
                    timeout_secs = timeout.as_secs(),
                    "Background task did not stop in time, aborting"
                );
                abort.abort();
                false
            }
        }
    }
}

/// Run `tick` every `period` until `cancel` fires.
///
/// The first iteration runs immediately. An iteration that has started runs
/// to completion; cancellation is only observed between iterations.
pub async fn run_every<F, Fut>(period: Duration, cancel: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => tick().await,
        }
    }
}
