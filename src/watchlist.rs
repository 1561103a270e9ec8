//! The watchlist file and the edits queued against it.
//!
//! `watchlist.txt` holds one map id per line. Blank lines and lines starting
//! with `#` are ignored; anything after a leading number (`379 - name`) is
//! ignored too.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use snafu::{ResultExt, Snafu};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::instrument;

use crate::model::MapId;

const HEADER: &str = "# One map number per line. Lines starting with # are comments.\n\
                      # Lines like `379 - some map` are fine too.\n";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WatchlistError {
    #[snafu(display("could not read watchlist {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not write watchlist {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not watch {} for changes: {source}", path.display()))]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },
}

/// A change requested from the prompt, applied on the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchlistEdit {
    Add(Vec<MapId>),
    Remove(Vec<MapId>),
}

pub fn parse_watchlist(text: &str) -> BTreeSet<MapId> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(MapId::from_leading_digits)
        .collect()
}

pub fn render_watchlist(ids: &BTreeSet<MapId>) -> String {
    let mut text = HEADER.to_string();
    for id in ids {
        text.push_str(&id.to_string());
        text.push('\n');
    }
    text
}

/// Read the watchlist. A missing file is an empty watchlist.
pub fn load(path: &Path) -> Result<BTreeSet<MapId>, WatchlistError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_watchlist(&text)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(error) => Err(error).context(ReadSnafu { path }),
    }
}

pub fn save(path: &Path, ids: &BTreeSet<MapId>) -> Result<(), WatchlistError> {
    std::fs::write(path, render_watchlist(ids)).context(WriteSnafu { path })
}

/// The current watchlist plus its change sources: the file on disk and the
/// edit queue fed by the prompt.
pub struct Watchlist {
    path: PathBuf,
    ids: BTreeSet<MapId>,
    edits: UnboundedReceiver<WatchlistEdit>,
    file_events: Option<UnboundedReceiver<notify::Result<Event>>>,
    _watcher: Option<RecommendedWatcher>,
}

impl Watchlist {
    /// Load the watchlist at `path`. Edits sent through the returned sender
    /// are applied and written back on the next [`Watchlist::pull`].
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, UnboundedSender<WatchlistEdit>), WatchlistError> {
        let path = path.into();
        let ids = load(&path)?;
        let (tx, rx) = mpsc::unbounded_channel();

        tracing::info!(path = %path.display(), count = ids.len(), "loaded watchlist");

        let watchlist = Self {
            path,
            ids,
            edits: rx,
            file_events: None,
            _watcher: None,
        };
        Ok((watchlist, tx))
    }

    /// Reload the file whenever it changes on disk.
    pub fn watch(mut self) -> Result<Self, WatchlistError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |result| {
            if tx.send(result).is_err() {
                tracing::debug!("watchlist change receiver dropped");
            }
        })
        .context(WatchSnafu {
            path: directory.clone(),
        })?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .context(WatchSnafu { path: directory })?;

        self.file_events = Some(rx);
        self._watcher = Some(watcher);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ids(&self) -> &BTreeSet<MapId> {
        &self.ids
    }

    /// Apply pending file changes and queued edits. Returns the new set when
    /// it differs from the previous one. File access runs on the blocking
    /// pool.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn pull(&mut self) -> Option<BTreeSet<MapId>> {
        let mut ids = self.ids.clone();

        if self.file_changed() {
            let path = self.path.clone();
            match tokio::task::spawn_blocking(move || load(&path)).await {
                Ok(Ok(reloaded)) => ids = reloaded,
                Ok(Err(error)) => tracing::warn!(%error, "keeping previous watchlist"),
                Err(error) => tracing::error!(%error, "watchlist reload task failed"),
            }
        }

        let mut edited = false;
        while let Ok(edit) = self.edits.try_recv() {
            edited |= apply_edit(&mut ids, edit);
        }

        if edited {
            let path = self.path.clone();
            let written = ids.clone();
            match tokio::task::spawn_blocking(move || save(&path, &written)).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::warn!(%error, "watchlist edit not saved"),
                Err(error) => tracing::error!(%error, "watchlist save task failed"),
            }
        }

        if ids == self.ids {
            return None;
        }

        tracing::debug!(count = ids.len(), "watchlist updated");
        self.ids = ids.clone();
        Some(ids)
    }

    fn file_changed(&mut self) -> bool {
        let Some(events) = self.file_events.as_mut() else {
            return false;
        };

        let mut changed = false;
        while let Ok(result) = events.try_recv() {
            match result {
                Ok(event) => changed |= is_relevant(&event, &self.path),
                Err(error) => tracing::warn!(%error, "watchlist watcher error"),
            }
        }
        changed
    }
}

fn apply_edit(ids: &mut BTreeSet<MapId>, edit: WatchlistEdit) -> bool {
    match edit {
        WatchlistEdit::Add(added) => added.into_iter().fold(false, |changed, id| ids.insert(id) | changed),
        WatchlistEdit::Remove(removed) => removed
            .into_iter()
            .fold(false, |changed, id| ids.remove(&id) | changed),
    }
}

fn is_relevant(event: &Event, path: &Path) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    );

    relevant_kind
        && event
            .paths
            .iter()
            .any(|changed| changed.file_name() == path.file_name())
}
