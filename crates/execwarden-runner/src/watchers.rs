use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::gate::{Claim, ResolutionGate};

/// One-shot request, from a winning watcher to the process owner, to kill the
/// child.
///
/// A request made before anyone waits is remembered.
#[derive(Debug, Default)]
pub(crate) struct TerminationRequest {
    notify: Notify,
}

impl TerminationRequest {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn request(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// Handle to a watcher task; aborts the task when dropped.
#[derive(Debug)]
pub(crate) struct WatcherHandle {
    task: Option<JoinHandle<bool>>,
}

impl WatcherHandle {
    /// Wait for the watcher to finish. `true` if it won the gate.
    #[cfg(test)]
    pub(crate) async fn fired(mut self) -> bool {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(false),
            None => false,
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Claims the gate as `claim` and requests termination, unless another
/// resolution got there first.
fn resolve(claim: Claim, gate: &ResolutionGate, termination: &TerminationRequest) -> bool {
    if gate.try_claim(claim) {
        termination.request();
        true
    } else {
        debug!(%claim, "Lost resolution race; doing nothing");
        false
    }
}

pub(crate) struct TimeoutWatcher;

impl TimeoutWatcher {
    /// Start the timer. Inert (`None`) when no timeout is configured.
    ///
    /// The timer stops without side effects once `disarm` is cancelled.
    pub(crate) fn spawn(
        timeout: Option<Duration>,
        gate: Arc<ResolutionGate>,
        termination: Arc<TerminationRequest>,
        disarm: CancellationToken,
    ) -> Option<WatcherHandle> {
        let timeout = timeout?;
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = disarm.cancelled() => false,
                () = tokio::time::sleep(timeout) => {
                    let won = resolve(Claim::TimedOut, &gate, &termination);
                    if won {
                        warn!(timeout_ms = timeout.as_millis(), "Timeout elapsed; terminating process");
                    }
                    won
                }
            }
        });
        Some(WatcherHandle { task: Some(task) })
    }
}

pub(crate) struct CancellationListener;

impl CancellationListener {
    /// Listen for `signal`, which may already be cancelled.
    pub(crate) fn spawn(
        signal: CancellationToken,
        gate: Arc<ResolutionGate>,
        termination: Arc<TerminationRequest>,
        disarm: CancellationToken,
    ) -> WatcherHandle {
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = disarm.cancelled() => false,
                () = signal.cancelled() => {
                    let won = resolve(Claim::Cancelled, &gate, &termination);
                    if won {
                        warn!("Cancellation requested; terminating process");
                    }
                    won
                }
            }
        });
        WatcherHandle { task: Some(task) }
    }
}
