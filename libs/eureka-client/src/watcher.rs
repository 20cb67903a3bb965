//! Registry change watcher.
//!
//! One background task polls [`Client::apps`] on a fixed interval, diffs the
//! result against the previous snapshot and sends the differences as
//! [`Event`]s through a bounded channel.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::client::Client;
use crate::config::WatchConfig;
use crate::model::{App, Event, EventKind, Instance, InstanceKey};
use crate::task::StopHandle;

type Snapshot = BTreeMap<InstanceKey, Instance>;

/// A running watcher.
///
/// Dropping the [`EventReceiver`] (or the whole watcher) cancels polling;
/// call [`stop`](Self::stop) to also wait for the task to finish.
#[derive(Debug)]
pub struct Watcher {
    handle: StopHandle,
    events: EventReceiver,
}

impl Watcher {
    pub(crate) fn spawn(client: Client, config: WatchConfig) -> Self {
        // tokio intervals reject a zero period
        let period = config.poll_interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));

        let poller = Poller {
            client,
            tx,
            snapshot: Snapshot::new(),
        };
        let task = tokio::spawn(poller.run(period, cancel.clone()));

        tracing::info!(
            poll_interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            event_buffer = config.event_buffer,
            "registry watcher started"
        );

        Self {
            handle: StopHandle::new(cancel.clone(), task),
            events: EventReceiver {
                rx,
                _stop_on_drop: cancel.clone().drop_guard(),
                cancel,
            },
        }
    }

    /// The event channel. Events arrive in detection order.
    pub fn events(&mut self) -> &mut EventReceiver {
        &mut self.events
    }

    /// A clonable handle that stops this watcher.
    #[must_use]
    pub fn handle(&self) -> StopHandle {
        self.handle.clone()
    }

    /// Stop polling and wait for the task to finish. No events are delivered
    /// afterwards. Calling it again is a no-op.
    pub async fn stop(&self) {
        self.handle.stop().await;
    }

    /// Split into the stop handle and the event receiver, e.g. to move the
    /// receiver into a consumer task.
    #[must_use]
    pub fn into_parts(self) -> (StopHandle, EventReceiver) {
        (self.handle, self.events)
    }
}

/// Receiving side of a watcher's event channel.
///
/// Also a [`Stream`] of [`Event`]s. Yields `None` once the watcher is
/// stopped, even if undelivered events are still buffered.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    _stop_on_drop: DropGuard,
}

impl EventReceiver {
    /// Wait for the next event. Returns `None` after the watcher stopped.
    pub async fn recv(&mut self) -> Option<Event> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    /// Take an already buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

impl Stream for EventReceiver {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        // Cancellation ends the task, which drops the sender and wakes us.
        this.rx.poll_recv(cx)
    }
}

struct Poller {
    client: Client,
    tx: mpsc::Sender<Event>,
    snapshot: Snapshot,
}

impl Poller {
    async fn run(mut self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let keep_polling = tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                keep = self.poll_once() => keep,
            };
            if !keep_polling {
                break;
            }
        }

        tracing::info!("registry watcher stopped");
    }

    /// Returns `false` once nobody is listening.
    async fn poll_once(&mut self) -> bool {
        let apps = match self.client.apps().await {
            Ok(apps) => apps,
            Err(e) => {
                tracing::warn!(error = %e, "registry poll failed, keeping previous snapshot");
                return true;
            }
        };

        let current = snapshot(apps);
        let events = diff(&self.snapshot, &current);
        tracing::debug!(
            instances = current.len(),
            events = events.len(),
            "registry polled"
        );

        for event in events {
            tracing::trace!(
                kind = ?event.kind,
                app = %event.instance.app_name,
                id = %event.instance.id,
                "registry event"
            );
            if self.tx.send(event).await.is_err() {
                return false;
            }
        }

        self.snapshot = current;
        true
    }
}

fn snapshot(apps: Vec<App>) -> Snapshot {
    apps.into_iter()
        .flat_map(|app| app.instances)
        .map(|instance| (instance.key(), instance))
        .collect()
}

/// Registered, then deregistered, then status changes; each group in key
/// order.
fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<Event> {
    let registered = current
        .iter()
        .filter(|(key, _)| !previous.contains_key(*key))
        .map(|(_, instance)| event(EventKind::InstanceRegistered, instance));

    let deregistered = previous
        .iter()
        .filter(|(key, _)| !current.contains_key(*key))
        .map(|(_, instance)| event(EventKind::InstanceDeregistered, instance));

    let changed = current.iter().filter_map(|(key, instance)| {
        let before = previous.get(key)?;
        (before.status != instance.status || before.status_override != instance.status_override)
            .then(|| event(EventKind::InstanceStatusChanged, instance))
    });

    registered.chain(deregistered).chain(changed).collect()
}

fn event(kind: EventKind, instance: &Instance) -> Event {
    Event {
        kind,
        instance: instance.clone(),
    }
}
