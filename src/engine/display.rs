use crate::model::{LiveEvent, MapId, Status, WatchEntry};
use crate::time::{self, Timestamp};

use super::FetchReason;

/// Connection state shown next to the map lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Waiting,
    Synced {
        reason: FetchReason,
        at: Timestamp,
    },
    Unreachable {
        failures: u32,
        last_success: Option<Timestamp>,
    },
}

impl SyncStatus {
    pub fn describe(&self, now: Timestamp) -> String {
        match self {
            SyncStatus::Waiting => "waiting for first fetch".to_string(),
            SyncStatus::Synced { reason, at } => {
                format!("synced {} ago ({reason})", time::age(*at, now))
            }
            SyncStatus::Unreachable {
                failures,
                last_success: Some(at),
            } => format!(
                "website unreachable ({failures} consecutive failures, last success {} ago)",
                time::age(*at, now)
            ),
            SyncStatus::Unreachable {
                failures,
                last_success: None,
            } => format!("website unreachable ({failures} consecutive failures)"),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, SyncStatus::Unreachable { .. })
    }
}

/// Immutable copy of the engine state, handed to renderers after each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub tick: u64,
    /// Bumped whenever something other than a countdown changed.
    pub revision: u64,
    /// Entries in display order.
    pub entries: Vec<WatchEntry>,
    pub watchlist: Vec<MapId>,
    pub status: SyncStatus,
    pub events: Vec<LiveEvent>,
    pub fetched: Option<FetchReason>,
}

impl DisplaySnapshot {
    pub fn empty() -> Self {
        Self {
            tick: 0,
            revision: 0,
            entries: Vec::new(),
            watchlist: Vec::new(),
            status: SyncStatus::Waiting,
            events: Vec::new(),
            fetched: None,
        }
    }

    pub fn live(&self) -> impl Iterator<Item = &WatchEntry> {
        self.entries.iter().filter(|entry| entry.is_live())
    }

    /// Tracked entries by ETA, unknown ones last.
    pub fn upcoming(&self) -> impl Iterator<Item = &WatchEntry> {
        self.entries.iter().filter(|entry| !entry.is_live())
    }

    pub fn get(&self, id: MapId) -> Option<&WatchEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn count(&self, status: Status) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_status_mentions_failures_and_age() {
        let now = time::now();
        let status = SyncStatus::Unreachable {
            failures: 3,
            last_success: Some(now - chrono::Duration::seconds(90)),
        };

        assert_eq!(
            status.describe(now),
            "website unreachable (3 consecutive failures, last success 1m 30s ago)"
        );

        let never = SyncStatus::Unreachable {
            failures: 1,
            last_success: None,
        };
        assert_eq!(never.describe(now), "website unreachable (1 consecutive failures)");
    }

    #[test]
    fn synced_status_names_the_reason() {
        let now = time::now();
        let status = SyncStatus::Synced {
            reason: FetchReason::Startup,
            at: now,
        };

        assert_eq!(status.describe(now), "synced 0s ago (startup)");
    }
}
