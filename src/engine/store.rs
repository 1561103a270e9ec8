use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::model::{MapId, Observation, Status, WatchEntry};

/// What changed when a new watchlist was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchlistDelta {
    pub added: Vec<MapId>,
    pub removed: Vec<MapId>,
}

impl WatchlistDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Per-map state plus the watchlist it was derived from.
///
/// Only the reconciliation loop mutates the store; everything else reads
/// copies handed out at the end of a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchStore {
    entries: BTreeMap<MapId, WatchEntry>,
    watchlist: BTreeSet<MapId>,
}

impl WatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously saved entries. Entries for maps that
    /// are no longer watched are only kept while live.
    pub fn restore(
        watchlist: BTreeSet<MapId>,
        entries: impl IntoIterator<Item = WatchEntry>,
    ) -> Self {
        let mut store = Self {
            entries: entries
                .into_iter()
                .filter(|entry| watchlist.contains(&entry.id) || entry.is_live())
                .map(|entry| (entry.id, entry))
                .collect(),
            watchlist: BTreeSet::new(),
        };

        store.apply_watchlist(watchlist);
        store
    }

    /// Replace the watchlist. New ids get an `Unknown` entry; removed ids
    /// lose their entry unless it is live, in which case it is dropped once
    /// it leaves `Live`.
    pub fn apply_watchlist(&mut self, watchlist: BTreeSet<MapId>) -> WatchlistDelta {
        let added = watchlist.difference(&self.watchlist).copied().collect_vec();
        let removed = self.watchlist.difference(&watchlist).copied().collect_vec();

        for id in &added {
            self.entries
                .entry(*id)
                .or_insert_with(|| WatchEntry::unknown(*id));
        }

        self.watchlist = watchlist;
        self.prune();

        WatchlistDelta { added, removed }
    }

    pub fn watchlist(&self) -> &BTreeSet<MapId> {
        &self.watchlist
    }

    pub fn is_watched(&self, id: MapId) -> bool {
        self.watchlist.contains(&id)
    }

    pub fn get(&self, id: MapId) -> Option<&WatchEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut WatchEntry> {
        self.entries.values_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchEntry> {
        self.entries.values()
    }

    pub fn ids(&self) -> Vec<MapId> {
        self.entries.keys().copied().collect()
    }

    /// Entries ordered for display: live first, then tracked by ascending
    /// ETA, then unknown. Ties are broken by map id.
    pub fn all(&self) -> Vec<&WatchEntry> {
        self.entries
            .values()
            .sorted_by_key(|entry| display_order(entry))
            .collect()
    }

    /// Merge what a fetch reported about one map. Returns `true` when a
    /// went-live notification is due. Maps without an entry are ignored
    /// unless they are on the watchlist.
    pub fn upsert_from_snapshot(
        &mut self,
        id: MapId,
        observation: &Observation,
        tick: u64,
        live_fallback: u64,
    ) -> bool {
        if !self.entries.contains_key(&id) && !self.watchlist.contains(&id) {
            return false;
        }

        self.entries
            .entry(id)
            .or_insert_with(|| WatchEntry::unknown(id))
            .observe(observation, tick, live_fallback)
    }

    /// Drop entries that are off the watchlist and not live.
    pub fn prune(&mut self) -> Vec<MapId> {
        let stale = self
            .entries
            .values()
            .filter(|entry| !self.watchlist.contains(&entry.id) && !entry.is_live())
            .map(|entry| entry.id)
            .collect_vec();

        for id in &stale {
            self.entries.remove(id);
        }

        stale
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, status: Status) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.status == status)
            .count()
    }
}

fn display_order(entry: &WatchEntry) -> (u8, u64, MapId) {
    match entry.status {
        Status::Live => (0, 0, entry.id),
        Status::Tracked => (1, entry.eta_seconds.unwrap_or(u64::MAX), entry.id),
        Status::Unknown => (2, 0, entry.id),
    }
}
