//! Plain-text rendering of display snapshots.

use itertools::Itertools;

use crate::engine::DisplaySnapshot;
use crate::model::{Status, WatchEntry};
use crate::time::{self, clock, Timestamp};
use crate::watcher::Snapshots;

const SEPARATOR: &str = "========================================";
const NONE: &str = "(none)";

fn live_line(entry: &WatchEntry) -> String {
    let mut line = format!("- {}", entry.id);

    if let Some(server) = &entry.server {
        line.push_str(&format!(" on {server}"));
    }
    if let Some(remaining) = entry.live_remaining_seconds.filter(|left| *left > 0) {
        line.push_str(&format!(" ({} remaining)", clock(remaining)));
    }

    line
}

fn upcoming_line(entry: &WatchEntry) -> String {
    match (entry.status, entry.eta_seconds) {
        (Status::Tracked, Some(eta)) => {
            let server = entry
                .server
                .as_ref()
                .map(|server| format!(" on {server}"))
                .unwrap_or_default();
            format!("- {} will be live in {}{server}", entry.id, clock(eta))
        }
        _ => format!("- {} will be live in unknown", entry.id),
    }
}

fn section(title: &str, lines: Vec<String>) -> String {
    if lines.is_empty() {
        return format!("{title}:\n{NONE}");
    }

    format!("{title}:\n{}", lines.join("\n"))
}

/// The full overview: live maps, upcoming maps and the sync status.
pub fn render(snapshot: &DisplaySnapshot, now: Timestamp) -> String {
    let live = snapshot.live().map(live_line).collect_vec();
    let upcoming = snapshot.upcoming().map(upcoming_line).collect_vec();

    [
        SEPARATOR.to_string(),
        section("Live", live),
        section("Tracked", upcoming),
        format!("Status: {}", snapshot.status.describe(now)),
    ]
    .join("\n")
}

/// One-line summary for the prompt.
pub fn summary(snapshot: &DisplaySnapshot, now: Timestamp) -> String {
    format!(
        "{} watched: {} live, {} tracked, {} unknown; {}",
        snapshot.watchlist.len(),
        snapshot.count(Status::Live),
        snapshot.count(Status::Tracked),
        snapshot.count(Status::Unknown),
        snapshot.status.describe(now)
    )
}

/// The watchlist as a comma separated list.
pub fn watchlist(snapshot: &DisplaySnapshot) -> String {
    if snapshot.watchlist.is_empty() {
        return "watchlist is empty".to_string();
    }

    snapshot.watchlist.iter().join(", ")
}

/// The overview for `snapshot`, unless one was already printed for its
/// revision.
fn overview(snapshot: &DisplaySnapshot, printed: &mut Option<u64>, now: Timestamp) -> Option<String> {
    if *printed == Some(snapshot.revision) {
        return None;
    }

    *printed = Some(snapshot.revision);
    Some(render(snapshot, now))
}

/// Print the overview to stdout whenever something other than a countdown
/// changed. Returns once the watcher stops publishing.
pub async fn follow(mut snapshots: Snapshots) {
    let mut printed = None;

    loop {
        let text = overview(&snapshots.borrow_and_update(), &mut printed, time::now());
        if let Some(text) = text {
            println!("{text}");
        }

        if snapshots.changed().await.is_err() {
            break;
        }
    }
}
