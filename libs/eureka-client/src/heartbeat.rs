use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::model::Instance;
use crate::task::StopHandle;

/// Background lease renewal for one instance.
///
/// The task keeps running through failed heartbeats. Dropping the value
/// cancels the task without waiting for it.
#[derive(Debug)]
pub struct HeartbeatTask {
    handle: StopHandle,
    _stop_on_drop: tokio_util::sync::DropGuard,
}

impl HeartbeatTask {
    pub(crate) fn spawn(client: Client, instance: Instance, interval: Duration) -> Self {
        let period = interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();

        tracing::info!(
            app = %instance.app_name,
            id = %instance.id,
            interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "heartbeat task started"
        );
        let task = tokio::spawn(run(client, instance, period, cancel.clone()));

        Self {
            handle: StopHandle::new(cancel.clone(), task),
            _stop_on_drop: cancel.drop_guard(),
        }
    }

    #[must_use]
    pub fn handle(&self) -> StopHandle {
        self.handle.clone()
    }

    /// Stop sending heartbeats and wait for an in-flight one to be abandoned.
    pub async fn stop(&self) {
        self.handle.stop().await;
    }
}

async fn run(client: Client, instance: Instance, period: Duration, cancel: CancellationToken) {
    // First tick completes immediately.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = client.heartbeat(&instance) => result,
        };

        match result {
            Ok(()) => tracing::debug!(app = %instance.app_name, id = %instance.id, "heartbeat sent"),
            Err(e) => tracing::warn!(
                app = %instance.app_name,
                id = %instance.id,
                error = %e,
                "heartbeat failed"
            ),
        }
    }

    tracing::info!(app = %instance.app_name, id = %instance.id, "heartbeat task stopped");
}
