//! Status snapshot on disk, so countdowns survive a restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::model::{MapId, ServerId, Status, WatchEntry};
use crate::time::Timestamp;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PersistError {
    #[snafu(display("could not access {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("malformed status file {}: {source}", path.display()))]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One map in `map_status.json`.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: Status,
    pub eta_seconds: Option<u64>,
    pub live_remaining_seconds: Option<u64>,
    pub server: Option<ServerId>,
    #[serde(default)]
    pub notified_live: bool,
    pub last_synced_at_tick: Option<u64>,
}

impl From<&WatchEntry> for StatusRecord {
    fn from(entry: &WatchEntry) -> Self {
        Self {
            status: entry.status,
            eta_seconds: entry.eta_seconds,
            live_remaining_seconds: entry.live_remaining_seconds,
            server: entry.server.clone(),
            notified_live: entry.notified_live,
            last_synced_at_tick: entry.last_synced_at_tick,
        }
    }
}

impl StatusRecord {
    /// Rebuild the entry after `offline` seconds without updates. A
    /// countdown that ran out in the meantime leaves the entry unknown.
    fn into_entry(self, id: MapId, offline: u64) -> WatchEntry {
        let mut entry = WatchEntry::unknown(id);

        let countdown = match self.status {
            Status::Unknown => return entry,
            Status::Tracked => self.eta_seconds,
            Status::Live => self.live_remaining_seconds,
        };
        let Some(left) = countdown.and_then(|left| left.checked_sub(offline)).filter(|left| *left > 0)
        else {
            return entry;
        };

        entry.status = self.status;
        entry.server = self.server;
        match self.status {
            Status::Tracked => entry.eta_seconds = Some(left),
            _ => {
                entry.live_remaining_seconds = Some(left);
                entry.notified_live = self.notified_live;
            }
        }

        entry
    }
}

/// Contents of `map_status.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFile {
    pub saved_at: Timestamp,
    pub entries: BTreeMap<MapId, StatusRecord>,
}

impl StatusFile {
    pub fn capture<'a>(entries: impl IntoIterator<Item = &'a WatchEntry>, saved_at: Timestamp) -> Self {
        Self {
            saved_at,
            entries: entries
                .into_iter()
                .map(|entry| (entry.id, StatusRecord::from(entry)))
                .collect(),
        }
    }

    /// Entries as they should look at `now`.
    pub fn restore(self, now: Timestamp) -> Vec<WatchEntry> {
        let offline = (now - self.saved_at).num_seconds().max(0).unsigned_abs();

        self.entries
            .into_iter()
            .map(|(id, record)| record.into_entry(id, offline))
            .collect()
    }
}

/// Where the status snapshot is kept.
pub trait Persistence: Send + Sync {
    /// `None` on a cold start.
    fn load_status(&self) -> Result<Option<StatusFile>, PersistError>;

    fn save_status(&self, status: &StatusFile) -> Result<(), PersistError>;
}

/// JSON file on disk, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for FileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load_status(&self) -> Result<Option<StatusFile>, PersistError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error).context(IoSnafu { path: &self.path }),
        };

        let status = serde_json::from_str(&text).context(JsonSnafu { path: &self.path })?;
        Ok(Some(status))
    }

    #[instrument(skip_all, fields(path = %self.path.display(), entries = status.entries.len()))]
    fn save_status(&self, status: &StatusFile) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(status).context(JsonSnafu { path: &self.path })?;

        let temporary = self.path.with_extension("json.tmp");
        std::fs::write(&temporary, json).context(IoSnafu { path: &temporary })?;
        std::fs::rename(&temporary, &self.path).context(IoSnafu { path: &self.path })?;

        tracing::debug!("saved status");
        Ok(())
    }
}
