use std::time::Duration;

use chrono::Utc;

pub type Timestamp = chrono::DateTime<Utc>;

pub fn now() -> Timestamp {
    Utc::now()
}

/// Fixed-cadence ticker for the reconciliation loop. Missed ticks are
/// skipped rather than bunched up after a slow fetch.
pub fn ticker(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    timer
}

/// `M:SS` as shown on the schedule page.
pub fn clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Parse the first `M:SS` / `MM:SS` occurrence in a text cell.
pub fn parse_clock(text: &str) -> Option<u64> {
    let bytes = text.as_bytes();

    for (colon, _) in text.match_indices(':') {
        let minutes_start = bytes[..colon]
            .iter()
            .rev()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if minutes_start == 0 || minutes_start > 2 {
            continue;
        }

        let Some(seconds) = bytes.get(colon + 1..colon + 3) else {
            continue;
        };
        if !seconds.iter().all(u8::is_ascii_digit) {
            continue;
        }

        let minutes: u64 = text[colon - minutes_start..colon].parse().ok()?;
        let seconds: u64 = text[colon + 1..colon + 3].parse().ok()?;
        return Some(minutes * 60 + seconds);
    }

    None
}

/// Rough human-readable age, e.g. `5m 3s`.
pub fn age(since: Timestamp, now: Timestamp) -> String {
    let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}
