use std::io::IsTerminal;
use std::sync::Arc;

use dotenvy::dotenv;
use snafu::ResultExt;
use tokio::sync::mpsc::UnboundedSender;

use kacky_watcher::config;
use kacky_watcher::engine::{Engine, WatchStore};
use kacky_watcher::error::*;
use kacky_watcher::fetcher::ScheduleFetcher;
use kacky_watcher::persist::{FileStore, Persistence};
use kacky_watcher::repl::{self, Repl};
use kacky_watcher::sink::{CommandSink, ConsoleSink};
use kacky_watcher::watcher::{Snapshots, Watcher};
use kacky_watcher::watchlist::{Watchlist, WatchlistEdit};
use kacky_watcher::{console, logger, time};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = config::load().context(ConfigLoadSnafu)?;

    let _guard = logger::init(&config)?;

    let (watchlist, edits) = Watchlist::open(config.watchlist_path()).context(WatchlistSnafu)?;
    let watchlist = watchlist.watch().context(WatchlistSnafu)?;

    let persistence = Arc::new(FileStore::new(config.status_path()));
    let store = restore(persistence.as_ref(), &watchlist);

    let url = config.schedule_url().context(ConfigLoadSnafu)?;
    tracing::info!(%url, mode = ?config.fetch_mode, watched = watchlist.ids().len(), "watching schedule");
    let fetcher = ScheduleFetcher::from_config(&config, url).context(FetcherSnafu)?;
    let sink = (ConsoleSink, config.notify_command.clone().map(CommandSink::new));

    let engine = Engine::restore(config.engine(), store);
    let handle = Watcher::new(engine, watchlist, fetcher, sink, persistence).spawn();
    tokio::spawn(console::follow(handle.snapshots()));

    let outcome = if std::io::stdin().is_terminal() {
        prompt(edits, handle.snapshots()).await
    } else {
        tracing::info!("stdin is not a terminal, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await.context(SignalSnafu)
    };

    handle.shutdown().await;
    outcome
}

/// Saved status from the last run, or an empty store on a cold start.
fn restore(persistence: &impl Persistence, watchlist: &Watchlist) -> WatchStore {
    let ids = watchlist.ids().clone();

    match persistence.load_status() {
        Ok(Some(status)) => {
            tracing::info!(saved_at = %status.saved_at, "restoring saved status");
            WatchStore::restore(ids, status.restore(time::now()))
        }
        Ok(None) => WatchStore::restore(ids, []),
        Err(error) => {
            tracing::warn!(%error, "ignoring unreadable status file");
            WatchStore::restore(ids, [])
        }
    }
}

async fn prompt(edits: UnboundedSender<WatchlistEdit>, snapshots: Snapshots) -> Result<(), ApplicationError> {
    tokio::task::spawn_blocking(move || {
        let mut repl = Repl::new()?;
        repl::start(&mut repl, &edits, &snapshots)
    })
    .await
    .context(ReplTaskSnafu)?
    .context(ReplSnafu)
}
