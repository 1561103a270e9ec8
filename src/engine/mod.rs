//! Reconciliation engine.
//!
//! One tick advances local countdowns, decides whether the schedule needs to
//! be fetched, merges the fetched truth and emits went-live events plus a
//! display snapshot. The engine owns all per-map state; callers only see the
//! copies it hands out.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::fetcher::{fetch_with_timeout, FetchError, Fetcher};
use crate::model::{LiveEvent, LocalTransition, MapId, ScheduleSnapshot, ServerId, Status};
use crate::time::{self, Timestamp};

mod display;
mod policy;
mod store;

pub use display::*;
pub use policy::*;
pub use store::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub tick_seconds: u64,
    pub request_timeout: Duration,
    pub unknown_retry_seconds: u64,
    pub max_staleness_seconds: u64,
    pub live_duration_seconds: u64,
    pub eta_proximity_threshold_seconds: Option<u64>,
    pub live_resync_seconds: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1,
            request_timeout: Duration::from_secs(10),
            unknown_retry_seconds: 60,
            max_staleness_seconds: 300,
            live_duration_seconds: 600,
            eta_proximity_threshold_seconds: None,
            live_resync_seconds: None,
        }
    }
}

impl EngineConfig {
    pub fn policy(&self) -> FetchPolicy {
        FetchPolicy {
            tick_seconds: self.tick_seconds,
            unknown_retry_seconds: self.unknown_retry_seconds,
            max_staleness_seconds: self.max_staleness_seconds,
            eta_proximity_threshold_seconds: self.eta_proximity_threshold_seconds,
            live_resync_seconds: self.live_resync_seconds,
        }
    }
}

/// Permission to run exactly one fetch. Results carrying an outdated
/// generation are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub tick: u64,
    pub reason: FetchReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied { events: usize },
    Failed,
    Discarded,
}

/// Everything a tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub events: Vec<LiveEvent>,
    pub fetch: Option<FetchReason>,
    pub merge: Option<MergeOutcome>,
    pub changed: bool,
    pub display: DisplaySnapshot,
}

type Shape = Vec<(MapId, Status, Option<ServerId>, bool)>;

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    policy: FetchPolicy,
    store: WatchStore,

    tick: u64,
    generation: u64,
    in_flight: Option<FetchTicket>,
    last_attempt_tick: Option<u64>,
    last_success_tick: Option<u64>,
    last_success_at: Option<Timestamp>,
    consecutive_failures: u32,
    watchlist_changed: bool,

    status: SyncStatus,
    events: Vec<LiveEvent>,
    fetched: Option<FetchReason>,
    merged: Option<MergeOutcome>,

    revision: u64,
    published: Shape,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::restore(config, WatchStore::new())
    }

    /// Start from a previously persisted store. The first tick fetches.
    pub fn restore(config: EngineConfig, store: WatchStore) -> Self {
        Self {
            policy: config.policy(),
            config,
            store,
            tick: 0,
            generation: 0,
            in_flight: None,
            last_attempt_tick: None,
            last_success_tick: None,
            last_success_at: None,
            consecutive_failures: 0,
            watchlist_changed: false,
            status: SyncStatus::Waiting,
            events: Vec::new(),
            fetched: None,
            merged: None,
            revision: 0,
            published: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &WatchStore {
        &self.store
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Run one full tick, fetching through `fetcher` if a fetch is due.
    pub async fn tick<F: Fetcher>(
        &mut self,
        watchlist: Option<BTreeSet<MapId>>,
        fetcher: &F,
    ) -> TickReport {
        if let Some(ticket) = self.begin_tick(watchlist) {
            let result = fetch_with_timeout(fetcher, ticket.tick, self.config.request_timeout).await;
            self.complete_fetch(ticket, result);
        }

        self.finish_tick()
    }

    /// First half of a tick: apply the pulled watchlist, advance countdowns
    /// and decide whether to fetch. Never blocks.
    pub fn begin_tick(&mut self, watchlist: Option<BTreeSet<MapId>>) -> Option<FetchTicket> {
        self.events.clear();
        self.fetched = None;
        self.merged = None;

        if let Some(watchlist) = watchlist {
            self.apply_watchlist(watchlist);
        }

        self.advance();

        let history = FetchHistory {
            now: self.tick,
            last_attempt: self.last_attempt_tick,
            last_success: self.last_success_tick,
            watchlist_changed: self.watchlist_changed,
            in_flight: self.in_flight.is_some(),
        };
        let reason = self.policy.decide(&self.store, &history)?;
        self.watchlist_changed = false;

        self.generation += 1;
        let ticket = FetchTicket {
            generation: self.generation,
            tick: self.tick,
            reason,
        };

        tracing::debug!(tick = self.tick, %reason, generation = ticket.generation, "fetch due");

        self.in_flight = Some(ticket);
        self.last_attempt_tick = Some(self.tick);
        self.fetched = Some(reason);

        Some(ticket)
    }

    /// Replace the watchlist. Newly added maps make the next tick fetch.
    pub fn apply_watchlist(&mut self, watchlist: BTreeSet<MapId>) -> WatchlistDelta {
        let delta = self.store.apply_watchlist(watchlist);

        if !delta.is_empty() {
            tracing::info!(added = ?delta.added, removed = ?delta.removed, "watchlist changed");
        }
        if !delta.added.is_empty() {
            self.watchlist_changed = true;
        }

        delta
    }

    /// Merge the result of the fetch `ticket` was issued for.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<ScheduleSnapshot, FetchError>,
    ) -> MergeOutcome {
        if self.in_flight != Some(ticket) {
            tracing::debug!(generation = ticket.generation, "discarding outdated fetch result");
            return MergeOutcome::Discarded;
        }
        self.in_flight = None;

        let outcome = match result {
            Ok(snapshot) => self.merge(ticket.reason, &snapshot),
            Err(error) => {
                self.consecutive_failures += 1;
                self.status = SyncStatus::Unreachable {
                    failures: self.consecutive_failures,
                    last_success: self.last_success_at,
                };

                tracing::warn!(
                    %error,
                    reason = %ticket.reason,
                    failures = self.consecutive_failures,
                    "could not fetch schedule"
                );
                MergeOutcome::Failed
            }
        };

        self.merged = Some(outcome);
        outcome
    }

    /// Drop the in-flight fetch without merging anything.
    pub fn abandon_fetch(&mut self, ticket: FetchTicket) {
        if self.in_flight == Some(ticket) {
            tracing::debug!(generation = ticket.generation, "abandoned fetch");
            self.in_flight = None;
        }
    }

    /// Second half of a tick: settle entries, prune and publish. While a
    /// fetch is still in flight, entries waiting on a re-check keep their
    /// episode open so a late confirmation does not notify twice.
    pub fn finish_tick(&mut self) -> TickReport {
        let waiting = self.in_flight.is_some();
        for entry in self.store.iter_mut() {
            if !(waiting && entry.needs_recheck()) {
                entry.settle();
            }
        }
        self.store.prune();

        let shape = self.shape();
        let changed = shape != self.published
            || !self.events.is_empty()
            || matches!(self.merged, Some(MergeOutcome::Applied { .. } | MergeOutcome::Failed));
        if changed {
            self.revision += 1;
            self.published = shape;
        }

        let report = TickReport {
            events: self.events.clone(),
            fetch: self.fetched,
            merge: self.merged,
            changed,
            display: self.display(),
        };

        self.tick += 1;
        report
    }

    pub fn display(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            tick: self.tick,
            revision: self.revision,
            entries: self.store.all().into_iter().cloned().collect(),
            watchlist: self.store.watchlist().iter().copied().collect(),
            status: self.status.clone(),
            events: self.events.clone(),
            fetched: self.fetched,
        }
    }

    fn advance(&mut self) {
        let elapsed = self.config.tick_seconds;
        let live_duration = self.config.live_duration_seconds;
        let tick = self.tick;
        let now = time::now();

        for entry in self.store.iter_mut() {
            match entry.advance(elapsed, live_duration) {
                Some(LocalTransition::WentLive) => {
                    entry.presumed_live_since = Some(tick);
                    if entry.mark_notified() {
                        tracing::info!(map.id = %entry.id, server = ?entry.server, tick, "map went live (countdown)");
                        self.events
                            .push(LiveEvent::new(entry.id, entry.server.clone(), tick, now));
                    }
                }
                Some(LocalTransition::Expired) => {
                    tracing::info!(map.id = %entry.id, tick, "live window expired, re-checking");
                }
                None => {}
            }
        }
    }

    fn merge(&mut self, reason: FetchReason, snapshot: &ScheduleSnapshot) -> MergeOutcome {
        let now = time::now();
        let notified = merge_snapshot(
            &mut self.store,
            snapshot,
            self.tick,
            self.config.live_duration_seconds,
        );

        for id in &notified {
            let server = self.store.get(*id).and_then(|entry| entry.server.clone());
            tracing::info!(map.id = %id, server = ?server, tick = self.tick, "map went live (fetch)");
            self.events
                .push(LiveEvent::new(*id, server, self.tick, now));
        }

        tracing::debug!(
            tick = self.tick,
            %reason,
            live = snapshot.live_count(),
            upcoming = snapshot.tracked_etas.len(),
            complete = snapshot.complete,
            "merged schedule"
        );

        self.last_success_tick = Some(self.tick);
        self.last_success_at = Some(now);
        self.consecutive_failures = 0;
        self.status = SyncStatus::Synced { reason, at: now };

        MergeOutcome::Applied {
            events: notified.len(),
        }
    }

    fn shape(&self) -> Shape {
        self.store
            .iter()
            .map(|entry| (entry.id, entry.status, entry.server.clone(), entry.notified_live))
            .collect()
    }
}

/// Apply a snapshot to every entry of the store. Returns the ids whose
/// went-live notification became due.
pub fn merge_snapshot(
    store: &mut WatchStore,
    snapshot: &ScheduleSnapshot,
    tick: u64,
    live_fallback: u64,
) -> Vec<MapId> {
    store
        .ids()
        .into_iter()
        .filter(|id| {
            let observation = snapshot.observation_for(*id);
            store.upsert_from_snapshot(*id, &observation, tick, live_fallback)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model::{Observation, WatchEntry};

    fn id(n: u32) -> MapId {
        MapId::try_from(n).unwrap()
    }

    fn ids(list: &[u32]) -> BTreeSet<MapId> {
        list.iter().copied().map(id).collect()
    }

    fn s1() -> ServerId {
        ServerId::new("S1")
    }

    /// Answers every fetch with whatever the closure returns for the tick.
    struct Scripted<F> {
        respond: F,
        calls: AtomicUsize,
    }

    impl<F> Scripted<F>
    where
        F: Fn(u64) -> Result<ScheduleSnapshot, FetchError> + Send + Sync,
    {
        fn new(respond: F) -> Self {
            Self {
                respond,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl<F> Fetcher for Scripted<F>
    where
        F: Fn(u64) -> Result<ScheduleSnapshot, FetchError> + Send + Sync,
    {
        fn fetch(
            &self,
            tick: u64,
        ) -> impl Future<Output = Result<ScheduleSnapshot, FetchError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready((self.respond)(tick))
        }
    }

    fn unreachable() -> FetchError {
        FetchError::Timeout {
            after: Duration::from_secs(10),
        }
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[tokio::test]
    async fn upcoming_map_goes_live_after_its_eta() {
        let mut engine = engine();
        let fetcher = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick).with_upcoming(s1(), id(379), 5))
        });

        let report = engine.tick(Some(ids(&[379])), &fetcher).await;
        assert_eq!(report.fetch, Some(FetchReason::Startup));
        assert_eq!(engine.store().get(id(379)).unwrap().status, Status::Tracked);

        let mut events = Vec::new();
        for _ in 1..=5 {
            let report = engine.tick(None, &fetcher).await;
            assert_eq!(report.fetch, None);
            events.extend(report.events);
        }

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].map, id(379));
        assert_eq!(events[0].server, Some(s1()));
        assert_eq!(events[0].tick, 5);

        let entry = engine.store().get(id(379)).unwrap();
        assert_eq!(entry.status, Status::Live);
        assert_eq!(entry.live_remaining_seconds, Some(600));
        assert!(entry.notified_live);
    }

    #[tokio::test]
    async fn expired_live_entry_is_rechecked_without_renotifying() {
        let mut entry = WatchEntry::unknown(id(379));
        entry.observe(
            &Observation::Live {
                server: s1(),
                remaining_seconds: Some(0),
            },
            0,
            600,
        );
        let store = WatchStore::restore(ids(&[379]), vec![entry]);
        let mut engine = Engine::restore(EngineConfig::default(), store);

        let fetcher = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick).with_live(s1(), id(379), Some(300)))
        });
        let report = engine.tick(None, &fetcher).await;

        assert_eq!(report.fetch, Some(FetchReason::LiveExpired));
        assert!(report.events.is_empty());

        let entry = engine.store().get(id(379)).unwrap();
        assert_eq!(entry.status, Status::Live);
        assert_eq!(entry.live_remaining_seconds, Some(300));
        assert!(entry.notified_live);
    }

    #[tokio::test]
    async fn expired_live_entry_absent_on_recheck_becomes_unknown() {
        let mut entry = WatchEntry::unknown(id(379));
        entry.observe(
            &Observation::Live {
                server: s1(),
                remaining_seconds: Some(1),
            },
            0,
            600,
        );
        let store = WatchStore::restore(ids(&[379]), vec![entry]);
        let mut engine = Engine::restore(EngineConfig::default(), store);

        let fetcher = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick).with_live(s1(), id(1), Some(300)))
        });
        let report = engine.tick(None, &fetcher).await;

        assert_eq!(report.fetch, Some(FetchReason::LiveExpired));
        let entry = engine.store().get(id(379)).unwrap();
        assert_eq!(entry.status, Status::Unknown);
        assert!(!entry.notified_live);
        assert!(!entry.needs_recheck());
    }

    #[tokio::test]
    async fn countdown_live_is_resynced_when_enabled() {
        let config = EngineConfig {
            live_resync_seconds: Some(5),
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);

        let fetcher = Scripted::new(|tick| {
            let snapshot = ScheduleSnapshot::new(tick);
            if tick == 0 {
                Ok(snapshot.with_upcoming(s1(), id(379), 3))
            } else {
                Ok(snapshot.with_live(ServerId::new("S2"), id(379), Some(900)))
            }
        });

        let mut events = Vec::new();
        let mut reasons = Vec::new();
        engine.tick(Some(ids(&[379])), &fetcher).await;
        for _ in 1..=8 {
            let report = engine.tick(None, &fetcher).await;
            events.extend(report.events);
            reasons.extend(report.fetch);
        }

        assert_eq!(reasons, vec![FetchReason::LiveResync]);
        assert_eq!(events.len(), 1);

        let entry = engine.store().get(id(379)).unwrap();
        assert_eq!(entry.server, Some(ServerId::new("S2")));
        assert_eq!(entry.live_remaining_seconds, Some(900));
        assert_eq!(entry.presumed_live_since(), None);
    }

    #[tokio::test]
    async fn failures_keep_state_while_countdowns_continue() {
        let config = EngineConfig {
            unknown_retry_seconds: 1,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);

        let ok = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick).with_upcoming(s1(), id(379), 100))
        });
        engine.tick(Some(ids(&[379, 385])), &ok).await;
        assert_eq!(engine.store().get(id(385)).unwrap().status, Status::Unknown);

        let failing = Scripted::new(|_| Err(unreachable()));
        for round in 1..=3u64 {
            let report = engine.tick(None, &failing).await;
            assert_eq!(report.fetch, Some(FetchReason::UnknownRetry));
            assert_eq!(report.merge, Some(MergeOutcome::Failed));

            let tracked = engine.store().get(id(379)).unwrap();
            assert_eq!(tracked.status, Status::Tracked);
            assert_eq!(tracked.eta_seconds, Some(100 - round));
            assert_eq!(tracked.server, Some(s1()));
            assert_eq!(engine.store().get(id(385)).unwrap().status, Status::Unknown);
        }

        assert_eq!(failing.calls(), 3);
        assert_eq!(engine.consecutive_failures(), 3);
        let status = engine.display().status.describe(time::now());
        assert!(status.starts_with("website unreachable (3 consecutive failures"), "{status}");
    }

    #[tokio::test]
    async fn success_after_failures_resets_counter() {
        let mut engine = engine();

        let failing = Scripted::new(|_| Err(unreachable()));
        engine.tick(Some(ids(&[379])), &failing).await;
        assert_eq!(engine.consecutive_failures(), 1);
        assert!(engine.status().is_unreachable());

        for _ in 1..60 {
            engine.tick(None, &failing).await;
        }
        let ok = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick).with_upcoming(s1(), id(379), 900))
        });
        let report = engine.tick(None, &ok).await;

        assert_eq!(report.fetch, Some(FetchReason::UnknownRetry));
        assert_eq!(engine.consecutive_failures(), 0);
        assert!(matches!(engine.status(), SyncStatus::Synced { .. }));
    }

    #[tokio::test]
    async fn no_fetch_before_staleness_window() {
        let mut engine = engine();
        let fetcher = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick).with_upcoming(s1(), id(379), 10_000))
        });

        engine.tick(Some(ids(&[379])), &fetcher).await;
        for _ in 1..300 {
            let report = engine.tick(None, &fetcher).await;
            assert_eq!(report.fetch, None);
        }
        assert_eq!(fetcher.calls(), 1);

        let report = engine.tick(None, &fetcher).await;
        assert_eq!(report.fetch, Some(FetchReason::Stale));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn countdown_drops_by_one_tick_each_tick() {
        let config = EngineConfig {
            tick_seconds: 2,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);
        let fetcher = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick).with_upcoming(s1(), id(379), 50))
        });

        engine.tick(Some(ids(&[379])), &fetcher).await;
        let mut previous = 50;
        for _ in 0..10 {
            engine.tick(None, &fetcher).await;
            let eta = engine.store().get(id(379)).unwrap().eta_seconds.unwrap();
            assert_eq!(eta, previous - 2);
            previous = eta;
        }
    }

    #[tokio::test]
    async fn eta_of_one_goes_live_on_next_tick() {
        let mut engine = engine();
        let fetcher = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick).with_upcoming(s1(), id(379), 1))
        });

        engine.tick(Some(ids(&[379])), &fetcher).await;
        assert!(!engine.store().get(id(379)).unwrap().notified_live);

        let report = engine.tick(None, &fetcher).await;
        assert_eq!(report.events.len(), 1);
        let entry = engine.store().get(id(379)).unwrap();
        assert_eq!(entry.status, Status::Live);
        assert!(entry.notified_live);
    }

    #[tokio::test]
    async fn one_notification_per_live_episode() {
        let config = EngineConfig {
            max_staleness_seconds: 5,
            unknown_retry_seconds: 5,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);

        // live, then back in the queue with a short eta, then live again
        let fetcher = Scripted::new(|tick| {
            let snapshot = ScheduleSnapshot::new(tick);
            match tick {
                0..=11 => Ok(snapshot.with_live(s1(), id(379), Some(1000))),
                12..=19 => Ok(snapshot.with_upcoming(s1(), id(379), 3)),
                _ => Ok(snapshot.with_live(s1(), id(379), Some(1000))),
            }
        });

        let mut events = Vec::new();
        let report = engine.tick(Some(ids(&[379])), &fetcher).await;
        events.extend(report.events);
        for _ in 1..30 {
            let report = engine.tick(None, &fetcher).await;
            events.extend(report.events);
        }

        let ticks = events.iter().map(|event| event.tick).collect::<Vec<_>>();
        assert_eq!(ticks, vec![0, 18]);
    }

    #[tokio::test]
    async fn new_watchlist_entry_is_fetched_right_away() {
        let mut engine = engine();
        let fetcher = Scripted::new(|tick| {
            Ok(ScheduleSnapshot::new(tick)
                .with_upcoming(s1(), id(379), 900)
                .with_upcoming(s1(), id(385), 1500))
        });

        engine.tick(Some(ids(&[379])), &fetcher).await;
        engine.tick(None, &fetcher).await;

        let report = engine.tick(Some(ids(&[379, 385])), &fetcher).await;
        assert_eq!(report.fetch, Some(FetchReason::WatchlistChanged));
        assert_eq!(engine.store().get(id(385)).unwrap().eta_seconds, Some(1500));

        let report = engine.tick(Some(ids(&[379])), &fetcher).await;
        assert_eq!(report.fetch, None);
        assert!(engine.store().get(id(385)).is_none());
    }

    #[test]
    fn merging_the_same_snapshot_twice_is_idempotent() {
        let mut store = WatchStore::new();
        store.apply_watchlist(ids(&[379, 385, 391, 400]));
        let mut snapshot = ScheduleSnapshot::new(0)
            .with_live(s1(), id(379), Some(120))
            .with_upcoming(ServerId::new("S2"), id(385), 620);
        snapshot.insert_unsettled(id(391));

        let first = merge_snapshot(&mut store, &snapshot, 7, 600);
        let once = store.clone();
        let second = merge_snapshot(&mut store, &snapshot, 7, 600);

        assert_eq!(first, vec![id(379)]);
        assert!(second.is_empty());
        assert_eq!(store, once);
    }

    #[test]
    fn incomplete_snapshot_does_not_demote_absent_entries() {
        let mut store = WatchStore::new();
        store.apply_watchlist(ids(&[379]));
        store.upsert_from_snapshot(
            id(379),
            &Observation::Upcoming {
                server: s1(),
                eta_seconds: 400,
            },
            0,
            600,
        );

        let mut snapshot = ScheduleSnapshot::new(1).with_live(s1(), id(1), None);
        snapshot.mark_incomplete();
        merge_snapshot(&mut store, &snapshot, 1, 600);

        let entry = store.get(id(379)).unwrap();
        assert_eq!(entry.status, Status::Tracked);
        assert_eq!(entry.eta_seconds, Some(400));
    }

    #[test]
    fn outdated_fetch_results_are_discarded() {
        let mut engine = engine();
        let ticket = engine.begin_tick(Some(ids(&[379]))).unwrap();
        engine.abandon_fetch(ticket);

        let outcome = engine.complete_fetch(
            ticket,
            Ok(ScheduleSnapshot::new(0).with_live(s1(), id(379), Some(100))),
        );
        assert_eq!(outcome, MergeOutcome::Discarded);
        assert_eq!(engine.store().get(id(379)).unwrap().status, Status::Unknown);

        let report = engine.finish_tick();
        assert!(report.events.is_empty());
    }

    #[test]
    fn no_second_fetch_while_one_is_in_flight() {
        let mut engine = engine();
        let first = engine.begin_tick(Some(ids(&[379])));
        assert!(first.is_some());
        engine.finish_tick();

        assert_eq!(engine.begin_tick(None), None);
    }

    #[test]
    fn revision_only_moves_on_structural_changes() {
        let mut engine = engine();
        let ticket = engine.begin_tick(Some(ids(&[379]))).unwrap();
        engine.complete_fetch(
            ticket,
            Ok(ScheduleSnapshot::new(0).with_upcoming(s1(), id(379), 100)),
        );
        let first = engine.finish_tick();
        assert!(first.changed);

        assert_eq!(engine.begin_tick(None), None);
        let second = engine.finish_tick();
        assert!(!second.changed);
        assert_eq!(second.display.revision, first.display.revision);
        assert_eq!(second.display.entries[0].eta_seconds, Some(99));
    }

    #[test]
    fn slow_recheck_confirming_live_does_not_notify_again() {
        let mut entry = WatchEntry::unknown(id(379));
        entry.observe(
            &Observation::Live {
                server: s1(),
                remaining_seconds: Some(1),
            },
            0,
            600,
        );
        let store = WatchStore::restore(ids(&[379]), vec![entry]);
        let mut engine = Engine::restore(EngineConfig::default(), store);

        let ticket = engine.begin_tick(None).unwrap();
        assert_eq!(ticket.reason, FetchReason::LiveExpired);
        engine.finish_tick();

        for _ in 0..3 {
            assert_eq!(engine.begin_tick(None), None);
            engine.finish_tick();
        }
        assert!(engine.store().get(id(379)).unwrap().notified_live);

        let outcome = engine.complete_fetch(
            ticket,
            Ok(ScheduleSnapshot::new(0).with_live(s1(), id(379), Some(300))),
        );
        assert_eq!(outcome, MergeOutcome::Applied { events: 0 });

        let report = engine.finish_tick();
        assert!(report.events.is_empty());
        assert_eq!(engine.store().get(id(379)).unwrap().status, Status::Live);
    }
}
