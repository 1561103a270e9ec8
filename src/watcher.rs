//! The tick loop.
//!
//! Runs the engine on its own task at a fixed cadence, delivers events,
//! publishes display snapshots and saves the status whenever it changed.
//! Fetches run on their own task so a slow page never delays a tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::instrument;

use crate::engine::{DisplaySnapshot, Engine, FetchTicket, TickReport};
use crate::fetcher::{fetch_with_timeout, FetchError, Fetcher};
use crate::model::ScheduleSnapshot;
use crate::persist::{Persistence, StatusFile};
use crate::sink::NotificationSink;
use crate::time;
use crate::watchlist::Watchlist;

pub type Snapshots = watch::Receiver<Arc<DisplaySnapshot>>;

/// Handle to a running watcher task.
#[derive(Debug)]
pub struct WatcherHandle {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    snapshots: Snapshots,
}

impl WatcherHandle {
    pub fn snapshots(&self) -> Snapshots {
        self.snapshots.clone()
    }

    /// Ask the loop to stop and wait for it. A fetch that is still running
    /// is aborted without being merged.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());

        if let Err(error) = self.handle.await {
            tracing::error!(%error, "watcher task failed");
        }
    }
}

/// A fetch running on its own task. It may span several ticks.
struct PendingFetch {
    ticket: FetchTicket,
    handle: JoinHandle<Result<ScheduleSnapshot, FetchError>>,
}

pub struct Watcher<F, S, P> {
    engine: Engine,
    watchlist: Watchlist,
    fetcher: Arc<F>,
    sink: S,
    persistence: Arc<P>,
    period: Duration,
    pending: Option<PendingFetch>,
    saved_revision: Option<u64>,
}

impl<F, S, P> Watcher<F, S, P>
where
    F: Fetcher + 'static,
    S: NotificationSink + 'static,
    P: Persistence + 'static,
{
    pub fn new(
        mut engine: Engine,
        watchlist: Watchlist,
        fetcher: F,
        sink: S,
        persistence: Arc<P>,
    ) -> Self {
        engine.apply_watchlist(watchlist.ids().clone());
        let period = Duration::from_secs(engine.config().tick_seconds);

        Self {
            engine,
            watchlist,
            fetcher: Arc::new(fetcher),
            sink,
            persistence,
            period,
            pending: None,
            saved_revision: None,
        }
    }

    pub fn spawn(self) -> WatcherHandle {
        let (stop, signal) = oneshot::channel();
        let (publisher, snapshots) = watch::channel(Arc::new(self.engine.display()));

        let handle = tokio::spawn(self.run(signal, publisher));

        WatcherHandle {
            stop,
            handle,
            snapshots,
        }
    }

    async fn run(mut self, mut signal: oneshot::Receiver<()>, publisher: watch::Sender<Arc<DisplaySnapshot>>) {
        tracing::info!(period = ?self.period, "watcher started");
        let mut timer = time::ticker(self.period);

        loop {
            select! {
                _ = &mut signal => break,

                started = timer.tick() => {
                    let (report, stopped) = self.tick(started + self.period, &mut signal).await;
                    self.publish(report, &publisher).await;

                    if stopped {
                        break;
                    }
                }
            }
        }

        self.cancel_fetch();
        self.write().await;
        tracing::info!(tick = self.engine.current_tick(), "watcher stopped");
    }

    /// One engine tick. A fetch gets until `deadline` to finish within this
    /// tick; otherwise it keeps running and countdowns carry on without it.
    /// Returns whether a stop arrived while waiting.
    async fn tick(&mut self, deadline: Instant, signal: &mut oneshot::Receiver<()>) -> (TickReport, bool) {
        let watchlist = self.watchlist.pull().await;

        if let Some(ticket) = self.engine.begin_tick(watchlist) {
            self.pending = Some(self.start_fetch(ticket));
        }

        let stopped = self.await_fetch(deadline, signal).await;
        (self.engine.finish_tick(), stopped)
    }

    fn start_fetch(&self, ticket: FetchTicket) -> PendingFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.engine.config().request_timeout;

        let handle = tokio::spawn(async move { fetch_with_timeout(fetcher.as_ref(), ticket.tick, timeout).await });
        PendingFetch { ticket, handle }
    }

    async fn await_fetch(&mut self, deadline: Instant, signal: &mut oneshot::Receiver<()>) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };
        let ticket = pending.ticket;

        select! {
            biased;

            joined = &mut pending.handle => {
                self.pending = None;
                match joined {
                    Ok(result) => {
                        self.engine.complete_fetch(ticket, result);
                    }
                    Err(error) => {
                        tracing::error!(%error, generation = ticket.generation, "fetch task failed");
                        self.engine.abandon_fetch(ticket);
                    }
                }
                false
            }
            _ = signal => true,
            _ = tokio::time::sleep_until(deadline) => false,
        }
    }

    fn cancel_fetch(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
            self.engine.abandon_fetch(pending.ticket);
        }
    }

    async fn publish(&mut self, report: TickReport, publisher: &watch::Sender<Arc<DisplaySnapshot>>) {
        for event in &report.events {
            if let Err(error) = self.sink.deliver(event).await {
                tracing::warn!(%error, map.id = %event.map, "could not deliver notification");
            }
        }

        publisher.send_replace(Arc::new(report.display));

        if report.changed {
            self.save().await;
        }
    }

    async fn save(&mut self) {
        if self.saved_revision == Some(self.engine.revision()) {
            return;
        }

        self.write().await;
    }

    /// Write the current state, countdowns included.
    #[instrument(skip(self), fields(revision = self.engine.revision()))]
    async fn write(&mut self) {
        let revision = self.engine.revision();
        let status = StatusFile::capture(self.engine.store().iter(), time::now());
        let persistence = Arc::clone(&self.persistence);

        match tokio::task::spawn_blocking(move || persistence.save_status(&status)).await {
            Ok(Ok(())) => self.saved_revision = Some(revision),
            Ok(Err(error)) => tracing::warn!(%error, "could not save status"),
            Err(error) => tracing::error!(%error, "status save task failed"),
        }
    }
}
