use super::*;

/// Lifecycle state of a watched map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No usable schedule data yet, or the last data went stale.
    #[default]
    Unknown,
    /// Upcoming on some server; `eta_seconds` counts down locally.
    Tracked,
    /// Currently being played; `live_remaining_seconds` counts down locally.
    Live,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Status::Unknown => "unknown",
            Status::Tracked => "tracked",
            Status::Live => "live",
        };
        f.write_str(text)
    }
}

/// What a single fetch says about one map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Live {
        server: ServerId,
        remaining_seconds: Option<u64>,
    },
    Upcoming {
        server: ServerId,
        eta_seconds: u64,
    },
    /// The map sits in a row that is switching maps; its timing cannot be trusted.
    Unsettled,
    Absent,
}

/// Outcome of counting an entry down by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTransition {
    /// ETA ran out; the entry is now presumed live.
    WentLive,
    /// The presumed live window ran out; the entry needs to be re-checked.
    Expired,
}

/// Per-map state owned by the watch store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub id: MapId,
    pub status: Status,
    pub eta_seconds: Option<u64>,
    pub live_remaining_seconds: Option<u64>,
    pub server: Option<ServerId>,
    pub notified_live: bool,
    pub last_synced_at_tick: Option<u64>,
    /// Set when a live window expired locally during the current tick.
    pub(crate) recheck_pending: bool,
    /// Tick at which a countdown put the entry live. Cleared by the next
    /// fetch that says anything about the map.
    pub(crate) presumed_live_since: Option<u64>,
}

impl WatchEntry {
    pub fn unknown(id: MapId) -> Self {
        Self {
            id,
            status: Status::Unknown,
            eta_seconds: None,
            live_remaining_seconds: None,
            server: None,
            notified_live: false,
            last_synced_at_tick: None,
            recheck_pending: false,
            presumed_live_since: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == Status::Live
    }

    pub fn needs_recheck(&self) -> bool {
        self.recheck_pending
    }

    /// The tick a countdown put this entry live, while its server and
    /// remaining time are still guesses.
    pub fn presumed_live_since(&self) -> Option<u64> {
        self.presumed_live_since
    }

    /// Count the active countdown down by `elapsed` seconds and apply the
    /// local transitions. Never touches `notified_live`; the caller decides
    /// whether a went-live event is due.
    pub fn advance(&mut self, elapsed: u64, live_duration: u64) -> Option<LocalTransition> {
        match self.status {
            Status::Unknown => None,
            Status::Tracked => {
                let eta = self.eta_seconds?.saturating_sub(elapsed);

                if eta > 0 {
                    self.eta_seconds = Some(eta);
                    return None;
                }

                self.status = Status::Live;
                self.eta_seconds = None;
                self.live_remaining_seconds = Some(live_duration);
                Some(LocalTransition::WentLive)
            }
            Status::Live => {
                let remaining = self
                    .live_remaining_seconds
                    .unwrap_or(0)
                    .saturating_sub(elapsed);

                if remaining > 0 {
                    self.live_remaining_seconds = Some(remaining);
                    return None;
                }

                self.status = Status::Unknown;
                self.live_remaining_seconds = None;
                self.presumed_live_since = None;
                self.recheck_pending = true;
                Some(LocalTransition::Expired)
            }
        }
    }

    /// Merge what a fetch reported about this map. Returns `true` when a
    /// went-live notification is due.
    pub fn observe(&mut self, observation: &Observation, tick: u64, live_fallback: u64) -> bool {
        if *observation != Observation::Unsettled {
            self.presumed_live_since = None;
        }

        match observation {
            Observation::Unsettled => return false,
            Observation::Live {
                server,
                remaining_seconds,
            } => {
                self.status = Status::Live;
                self.eta_seconds = None;
                self.live_remaining_seconds = Some(remaining_seconds.unwrap_or(live_fallback));
                self.server = Some(server.clone());
                self.recheck_pending = false;
                self.last_synced_at_tick = Some(tick);

                return self.mark_notified();
            }
            Observation::Upcoming {
                server,
                eta_seconds,
            } => {
                self.status = Status::Tracked;
                self.eta_seconds = Some(*eta_seconds);
                self.live_remaining_seconds = None;
                self.server = Some(server.clone());
                self.notified_live = false;
            }
            Observation::Absent => {
                self.status = Status::Unknown;
                self.eta_seconds = None;
                self.live_remaining_seconds = None;
                self.server = None;
                self.notified_live = false;
            }
        }

        self.recheck_pending = false;
        self.last_synced_at_tick = Some(tick);
        false
    }

    /// Flag the current live episode as notified. Returns `true` only the
    /// first time for an episode.
    pub fn mark_notified(&mut self) -> bool {
        if self.notified_live {
            return false;
        }

        self.notified_live = true;
        true
    }

    /// Close out the tick: an entry that left `Live` and was not confirmed
    /// live again has ended its episode.
    pub(crate) fn settle(&mut self) {
        if self.status == Status::Unknown {
            self.notified_live = false;
            self.recheck_pending = false;
        }
    }
}
