use serde::{Deserialize, Serialize};

use crate::model::Status;

use super::store::WatchStore;

/// Why the engine decided to hit the schedule page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchReason {
    /// A presumed live window ran out; confirm whether the map is still up.
    LiveExpired,
    /// First fetch of this process.
    Startup,
    /// Maps were added to the watchlist and have no data yet.
    WatchlistChanged,
    /// Some entries are still unknown; retry on the slow cadence.
    UnknownRetry,
    /// The last good fetch is too old to trust local countdowns.
    Stale,
    /// Optional: a tracked ETA is close to zero.
    EtaProximity,
    /// Optional: a map went live by countdown a while ago; learn its real
    /// server and remaining time.
    LiveResync,
}

impl std::fmt::Display for FetchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FetchReason::LiveExpired => "live window expired",
            FetchReason::Startup => "startup",
            FetchReason::WatchlistChanged => "watchlist changed",
            FetchReason::UnknownRetry => "unknown maps",
            FetchReason::Stale => "staleness check",
            FetchReason::EtaProximity => "eta proximity",
            FetchReason::LiveResync => "live resync",
        };
        f.write_str(text)
    }
}

/// Fetch bookkeeping the policy looks at, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchHistory {
    pub now: u64,
    pub last_attempt: Option<u64>,
    pub last_success: Option<u64>,
    pub watchlist_changed: bool,
    pub in_flight: bool,
}

/// Decides when a fetch is due.
///
/// Fetches are reserved for missing, stale or expired data. A small ETA is
/// not a reason to fetch unless `eta_proximity_threshold_seconds` is set,
/// and a countdown going live only triggers a follow-up fetch when
/// `live_resync_seconds` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub tick_seconds: u64,
    pub unknown_retry_seconds: u64,
    pub max_staleness_seconds: u64,
    pub eta_proximity_threshold_seconds: Option<u64>,
    pub live_resync_seconds: Option<u64>,
}

impl FetchPolicy {
    pub fn decide(&self, store: &WatchStore, history: &FetchHistory) -> Option<FetchReason> {
        if history.in_flight || store.is_empty() {
            return None;
        }

        if store.iter().any(|entry| entry.needs_recheck()) {
            return Some(FetchReason::LiveExpired);
        }

        let Some(last_attempt) = history.last_attempt else {
            return Some(FetchReason::Startup);
        };
        let since_attempt = self.seconds_between(last_attempt, history.now);

        let has_fresh_unknown = store
            .iter()
            .any(|entry| entry.status == Status::Unknown && entry.last_synced_at_tick.is_none());
        if history.watchlist_changed && has_fresh_unknown {
            return Some(FetchReason::WatchlistChanged);
        }

        if let Some(delay) = self.live_resync_seconds {
            let due = store.iter().any(|entry| {
                entry.is_live()
                    && entry
                        .presumed_live_since()
                        .is_some_and(|since| self.seconds_between(since, history.now) >= delay)
            });

            if due && since_attempt >= delay.min(self.unknown_retry_seconds) {
                return Some(FetchReason::LiveResync);
            }
        }

        if store.count(Status::Unknown) > 0 && since_attempt >= self.unknown_retry_seconds {
            return Some(FetchReason::UnknownRetry);
        }

        // After failures, retry no faster than the unknown cadence.
        let since_success = self.seconds_between(history.last_success.unwrap_or(0), history.now);
        let retry_gap = self.unknown_retry_seconds.min(self.max_staleness_seconds);
        if since_success >= self.max_staleness_seconds && since_attempt >= retry_gap {
            return Some(FetchReason::Stale);
        }

        if let Some(threshold) = self.eta_proximity_threshold_seconds {
            let near = store.iter().any(|entry| {
                entry.status == Status::Tracked
                    && entry.eta_seconds.is_some_and(|eta| eta <= threshold)
            });

            if near && since_attempt >= threshold {
                return Some(FetchReason::EtaProximity);
            }
        }

        None
    }

    fn seconds_between(&self, from: u64, to: u64) -> u64 {
        to.saturating_sub(from).saturating_mul(self.tick_seconds)
    }
}
