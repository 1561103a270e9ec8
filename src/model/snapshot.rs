use std::collections::{BTreeMap, BTreeSet};

use super::*;

/// Upcoming slot of a map: seconds until it goes live and where.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Upcoming {
    pub eta_seconds: u64,
    pub server: ServerId,
}

/// Result of one schedule fetch.
///
/// Produced by a fetcher and only read afterwards. A snapshot flagged as
/// incomplete had rows that could not be parsed, so an id missing from it
/// says nothing about that map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    pub fetched_at_tick: u64,
    pub live_by_server: BTreeMap<ServerId, BTreeMap<MapId, Option<u64>>>,
    pub tracked_etas: BTreeMap<MapId, Upcoming>,
    pub unsettled: BTreeSet<MapId>,
    pub complete: bool,
}

impl ScheduleSnapshot {
    pub fn new(fetched_at_tick: u64) -> Self {
        Self {
            fetched_at_tick,
            live_by_server: BTreeMap::new(),
            tracked_etas: BTreeMap::new(),
            unsettled: BTreeSet::new(),
            complete: true,
        }
    }

    pub fn with_live(mut self, server: ServerId, map: MapId, remaining_seconds: Option<u64>) -> Self {
        self.insert_live(server, map, remaining_seconds);
        self
    }

    pub fn with_upcoming(mut self, server: ServerId, map: MapId, eta_seconds: u64) -> Self {
        self.insert_upcoming(server, map, eta_seconds);
        self
    }

    pub fn insert_live(&mut self, server: ServerId, map: MapId, remaining_seconds: Option<u64>) {
        self.live_by_server
            .entry(server)
            .or_default()
            .insert(map, remaining_seconds);
    }

    /// Record an upcoming slot, keeping the earliest one per map.
    pub fn insert_upcoming(&mut self, server: ServerId, map: MapId, eta_seconds: u64) {
        match self.tracked_etas.get(&map) {
            Some(existing) if existing.eta_seconds <= eta_seconds => {}
            _ => {
                self.tracked_etas
                    .insert(map, Upcoming::new(eta_seconds, server));
            }
        }
    }

    pub fn insert_unsettled(&mut self, map: MapId) {
        self.unsettled.insert(map);
    }

    pub fn mark_incomplete(&mut self) {
        self.complete = false;
    }

    pub fn is_empty(&self) -> bool {
        self.live_by_server.is_empty() && self.tracked_etas.is_empty() && self.unsettled.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.live_by_server.values().map(BTreeMap::len).sum()
    }

    /// The server a map is live on. With several, the one that keeps it
    /// live the longest wins; ties go to the first server label.
    pub fn live_on(&self, map: MapId) -> Option<(&ServerId, Option<u64>)> {
        let mut best: Option<(&ServerId, Option<u64>)> = None;

        for (server, maps) in &self.live_by_server {
            let Some(&remaining) = maps.get(&map) else {
                continue;
            };

            let better = match best {
                None => true,
                Some((_, current)) => remaining.unwrap_or(0) > current.unwrap_or(0),
            };

            if better {
                best = Some((server, remaining));
            }
        }

        best
    }

    /// What this snapshot says about one map.
    pub fn observation_for(&self, map: MapId) -> Observation {
        if let Some((server, remaining_seconds)) = self.live_on(map) {
            return Observation::Live {
                server: server.clone(),
                remaining_seconds,
            };
        }

        if self.unsettled.contains(&map) {
            return Observation::Unsettled;
        }

        match self.tracked_etas.get(&map) {
            Some(upcoming) => Observation::Upcoming {
                server: upcoming.server.clone(),
                eta_seconds: upcoming.eta_seconds,
            },
            None if self.complete => Observation::Absent,
            None => Observation::Unsettled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> MapId {
        MapId::try_from(n).unwrap()
    }

    #[test]
    fn earliest_upcoming_wins() {
        let snapshot = ScheduleSnapshot::new(0)
            .with_upcoming(ServerId::numbered(1), id(385), 900)
            .with_upcoming(ServerId::numbered(2), id(385), 300)
            .with_upcoming(ServerId::numbered(3), id(385), 600);

        assert_eq!(
            snapshot.observation_for(id(385)),
            Observation::Upcoming {
                server: ServerId::numbered(2),
                eta_seconds: 300
            }
        );
    }

    #[test]
    fn live_beats_upcoming_and_longest_remaining_wins() {
        let snapshot = ScheduleSnapshot::new(0)
            .with_upcoming(ServerId::numbered(4), id(379), 100)
            .with_live(ServerId::numbered(1), id(379), Some(120))
            .with_live(ServerId::numbered(2), id(379), Some(480));

        assert_eq!(
            snapshot.observation_for(id(379)),
            Observation::Live {
                server: ServerId::numbered(2),
                remaining_seconds: Some(480)
            }
        );
    }

    #[test]
    fn missing_id_depends_on_completeness() {
        let mut snapshot = ScheduleSnapshot::new(0).with_live(ServerId::numbered(1), id(1), Some(5));
        assert_eq!(snapshot.observation_for(id(2)), Observation::Absent);

        snapshot.mark_incomplete();
        assert_eq!(snapshot.observation_for(id(2)), Observation::Unsettled);
    }

    #[test]
    fn unsettled_beats_upcoming() {
        let mut snapshot = ScheduleSnapshot::new(0).with_upcoming(ServerId::numbered(1), id(7), 60);
        snapshot.insert_unsettled(id(7));

        assert_eq!(snapshot.observation_for(id(7)), Observation::Unsettled);
        assert_eq!(snapshot.live_count(), 0);
    }
}
