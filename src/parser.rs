//! Schedule page parsing.
//!
//! The page is a table with one row per server: the server badge, the map
//! that is live right now, the next maps in order and the remaining time of
//! the live map.

use scraper::{ElementRef, Html, Selector};
use snafu::{OptionExt, Snafu};

use crate::model::{MapId, ScheduleSnapshot, ServerId};
use crate::time::parse_clock;

/// Every map slot on a server lasts this long.
pub const MAP_SLOT_SECONDS: u64 = 600;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParseError {
    #[snafu(display("could not find the schedule table"))]
    MissingTable,

    #[snafu(display("schedule table has no body"))]
    MissingBody,

    #[snafu(display("schedule table has no usable rows ({skipped} skipped)"))]
    EmptySchedule { skipped: usize },

    #[snafu(display("invalid selector `{selector}`: {reason}"))]
    InvalidSelector {
        selector: &'static str,
        reason: String,
    },
}

struct Selectors {
    tables: [Selector; 2],
    bodies: [Selector; 2],
    rows: [Selector; 2],
    cells: [Selector; 2],
    badges: [Selector; 2],
    map_link: Selector,
}

impl Selectors {
    fn new() -> Result<Self, ParseError> {
        Ok(Self {
            tables: [selector(r#"table[data-slot="table"]"#)?, selector("table")?],
            bodies: [selector(r#"tbody[data-slot="table-body"]"#)?, selector("tbody")?],
            rows: [selector(r#"tr[data-slot="table-row"]"#)?, selector("tr")?],
            cells: [selector(r#"td[data-slot="table-cell"]"#)?, selector("td")?],
            badges: [selector(r#"span[data-slot="badge"]"#)?, selector("span")?],
            map_link: selector(r#"a[href*="/map/"]"#)?,
        })
    }
}

fn selector(source: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(source).map_err(|error| ParseError::InvalidSelector {
        selector: source,
        reason: format!("{error:?}"),
    })
}

/// First element matching the preferred selector, else the fallback.
fn first<'a>(scope: ElementRef<'a>, selectors: &[Selector; 2]) -> Option<ElementRef<'a>> {
    selectors
        .iter()
        .find_map(|selector| scope.select(selector).next())
}

fn all<'a>(scope: ElementRef<'a>, selectors: &[Selector; 2], at_least: usize) -> Vec<ElementRef<'a>> {
    let preferred = scope.select(&selectors[0]).collect::<Vec<_>>();
    if preferred.len() >= at_least.max(1) {
        return preferred;
    }

    scope.select(&selectors[1]).collect()
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Text consisting of digits only, e.g. a badge or a map link.
fn number_of(element: ElementRef<'_>) -> Option<u32> {
    let text = text_of(element);
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    text.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ServerRow {
    server: ServerId,
    live: MapId,
    next: Vec<MapId>,
    remaining_seconds: Option<u64>,
}

fn parse_row(row: ElementRef<'_>, selectors: &Selectors) -> Option<ServerRow> {
    let cells = all(row, &selectors.cells, 4);
    if cells.len() < 4 {
        return None;
    }

    let badge = first(cells[0], &selectors.badges)?;
    let server = ServerId::numbered(number_of(badge)?);

    let live_link = cells[1].select(&selectors.map_link).next()?;
    let live = MapId::try_from(number_of(live_link)?).ok()?;

    let next = cells[2]
        .select(&selectors.map_link)
        .filter_map(|link| MapId::try_from(number_of(link)?).ok())
        .collect();

    let remaining_seconds = parse_clock(&text_of(cells[3]));

    Some(ServerRow {
        server,
        live,
        next,
        remaining_seconds,
    })
}

/// Parse the rendered schedule page into a snapshot.
///
/// Rows that cannot be read are skipped and mark the snapshot incomplete.
/// Rows whose time cell is empty are switching maps; their maps are
/// reported as unsettled rather than live or upcoming.
pub fn parse_schedule(html: &str, tick: u64) -> Result<ScheduleSnapshot, ParseError> {
    let selectors = Selectors::new()?;
    let document = Html::parse_document(html);
    let root = document.root_element();

    let table = first(root, &selectors.tables).context(MissingTableSnafu)?;
    let body = first(table, &selectors.bodies).context(MissingBodySnafu)?;

    let mut snapshot = ScheduleSnapshot::new(tick);
    let mut parsed = 0;
    let mut skipped = 0usize;

    for row in all(body, &selectors.rows, 1) {
        let Some(row) = parse_row(row, &selectors) else {
            skipped += 1;
            continue;
        };
        parsed += 1;

        let Some(remaining) = row.remaining_seconds else {
            tracing::debug!(server = %row.server, map.id = %row.live, "time cell empty, row is switching maps");

            snapshot.insert_unsettled(row.live);
            for map in row.next {
                snapshot.insert_unsettled(map);
            }
            continue;
        };

        snapshot.insert_live(row.server.clone(), row.live, Some(remaining));
        for (slot, map) in (0u64..).zip(row.next) {
            let eta = remaining + slot * MAP_SLOT_SECONDS;
            snapshot.insert_upcoming(row.server.clone(), map, eta);
        }
    }

    if skipped > 0 {
        tracing::debug!(parsed, skipped, "skipped unreadable schedule rows");
        snapshot.mark_incomplete();
    }

    if parsed == 0 {
        return EmptyScheduleSnafu { skipped }.fail();
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use crate::model::Observation;

    use super::*;

    fn id(n: u32) -> MapId {
        MapId::try_from(n).unwrap()
    }

    fn row(server: &str, live: &str, next: &[&str], time: &str) -> String {
        let next = next
            .iter()
            .map(|map| format!(r#"<a href="/map/{map}">{map}</a>"#))
            .collect::<String>();

        format!(
            r#"<tr data-slot="table-row">
                <td data-slot="table-cell"><span data-slot="badge">{server}</span></td>
                <td data-slot="table-cell"><a href="/map/{live}">{live}</a><span>LIVE</span></td>
                <td data-slot="table-cell">{next}</td>
                <td data-slot="table-cell"><div><span>{time}</span></div></td>
            </tr>"#
        )
    }

    fn page(rows: &[String]) -> String {
        format!(
            r#"<html><body>
                <table data-slot="table">
                    <thead><tr><th>#</th><th>Now</th><th>Next Maps</th><th>Time</th></tr></thead>
                    <tbody data-slot="table-body">{}</tbody>
                </table>
            </body></html>"#,
            rows.concat()
        )
    }

    #[test]
    fn reads_live_and_upcoming_maps() {
        let html = page(&[
            row("1", "379", &["380", "381", "382"], "9:12"),
            row("2", "390", &["391"], "0:45"),
        ]);

        let snapshot = parse_schedule(&html, 4).unwrap();

        assert_eq!(snapshot.fetched_at_tick, 4);
        assert!(snapshot.complete);
        assert_eq!(snapshot.live_count(), 2);
        assert_eq!(
            snapshot.observation_for(id(379)),
            Observation::Live {
                server: ServerId::numbered(1),
                remaining_seconds: Some(552)
            }
        );
        assert_eq!(snapshot.tracked_etas[&id(380)].eta_seconds, 552);
        assert_eq!(snapshot.tracked_etas[&id(381)].eta_seconds, 1152);
        assert_eq!(snapshot.tracked_etas[&id(382)].eta_seconds, 1752);
        assert_eq!(snapshot.tracked_etas[&id(391)].server, ServerId::numbered(2));
        assert_eq!(snapshot.observation_for(id(500)), Observation::Absent);
    }

    #[test]
    fn earliest_server_wins_for_upcoming_map() {
        let html = page(&[
            row("1", "10", &["20", "30"], "5:00"),
            row("2", "11", &["30"], "1:00"),
        ]);

        let snapshot = parse_schedule(&html, 0).unwrap();
        let upcoming = &snapshot.tracked_etas[&id(30)];

        assert_eq!(upcoming.eta_seconds, 60);
        assert_eq!(upcoming.server, ServerId::numbered(2));
    }

    #[test]
    fn empty_time_cell_marks_row_unsettled() {
        let html = page(&[
            row("1", "379", &["380"], ""),
            row("2", "390", &["391"], "3:00"),
        ]);

        let snapshot = parse_schedule(&html, 0).unwrap();

        assert_eq!(snapshot.observation_for(id(379)), Observation::Unsettled);
        assert_eq!(snapshot.observation_for(id(380)), Observation::Unsettled);
        assert!(snapshot.complete);
        assert_eq!(snapshot.live_count(), 1);
    }

    #[test]
    fn broken_rows_are_skipped_and_flagged() {
        let broken = r#"<tr data-slot="table-row"><td><span>x</span></td><td>nothing</td><td></td><td>1:00</td></tr>"#;
        let html = page(&[broken.to_string(), row("3", "379", &[], "2:00")]);

        let snapshot = parse_schedule(&html, 0).unwrap();

        assert!(!snapshot.complete);
        assert_eq!(snapshot.live_count(), 1);
        assert_eq!(snapshot.observation_for(id(400)), Observation::Unsettled);
    }

    #[test]
    fn rows_without_data_slots_still_parse() {
        let html = r#"<table><tbody>
            <tr><td><span>4</span></td><td><a href="/map/77">77</a></td><td><a href="/map/78">78</a></td><td>10:00</td></tr>
        </tbody></table>"#;

        let snapshot = parse_schedule(html, 0).unwrap();
        assert_eq!(
            snapshot.live_on(id(77)).map(|(server, _)| server.clone()),
            Some(ServerId::numbered(4))
        );
        assert_eq!(snapshot.tracked_etas[&id(78)].eta_seconds, 600);
    }

    #[test]
    fn page_without_table_is_an_error() {
        let error = parse_schedule("<html><body><p>loading...</p></body></html>", 0).unwrap_err();
        assert!(matches!(error, ParseError::MissingTable));
    }

    #[test]
    fn table_without_rows_is_an_error() {
        let error = parse_schedule(&page(&[]), 0).unwrap_err();
        assert!(matches!(error, ParseError::EmptySchedule { skipped: 0 }));
    }

    #[test]
    fn only_broken_rows_reports_how_many_were_skipped() {
        let broken = r#"<tr data-slot="table-row"><td><span>x</span></td><td>nothing</td><td></td><td>1:00</td></tr>"#;
        let html = page(&[broken.to_string(), broken.to_string()]);

        let error = parse_schedule(&html, 0).unwrap_err();
        assert!(matches!(error, ParseError::EmptySchedule { skipped: 2 }));
        assert_eq!(error.to_string(), "schedule table has no usable rows (2 skipped)");
    }
}
