use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Stops one background task.
///
/// Clones control the same task. [`stop`](Self::stop) may be called from
/// any task and any number of times; every call returns only once the task
/// has finished.
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl StopHandle {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Cancel the task and wait for it to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let mut task = self.task.lock().await;
        if let Some(join) = task.take()
            && let Err(e) = join.await
            && e.is_panic()
        {
            tracing::error!(error = %e, "background task panicked");
        }
    }

    /// Whether [`stop`](Self::stop) has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
