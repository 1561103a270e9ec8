use crate::time::Timestamp;

use super::*;

/// Emitted once per live episode when a watched map goes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct LiveEvent {
    pub map: MapId,
    pub server: Option<ServerId>,
    pub tick: u64,
    pub at: Timestamp,
}

impl std::fmt::Display for LiveEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.server {
            Some(server) => write!(f, "KACKY MAP LIVE: #{} on {}", self.map, server),
            None => write!(f, "KACKY MAP LIVE: #{}", self.map),
        }
    }
}
