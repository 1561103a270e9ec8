//! Schedule retrieval.
//!
//! Every way of getting the page implements [`Fetcher`]; the engine applies
//! the same timeout to all of them through [`fetch_with_timeout`].

use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;

use snafu::Snafu;
use url::Url;

use crate::config::{Config, FetchMode};
use crate::model::ScheduleSnapshot;
use crate::parser::ParseError;

mod browser;
mod http;

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FetchError {
    #[snafu(display("schedule fetch timed out after {}", humantime::format_duration(*after)))]
    Timeout { after: Duration },

    #[snafu(display("could not build the http client: {source}"))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("could not fetch {url}: {source}"))]
    Network { url: Url, source: reqwest::Error },

    #[snafu(display("could not launch headless browser `{program}`: {source}"))]
    Browser {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("headless browser `{program}` exited with {status}: {stderr}"))]
    BrowserExit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[snafu(display("unexpected schedule page: {source}"))]
    Parse { source: ParseError },
}

/// Produces a schedule snapshot for the given tick.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, tick: u64) -> impl Future<Output = Result<ScheduleSnapshot, FetchError>> + Send;
}

/// Run one fetch, giving up after `timeout`. The fetch future is dropped on
/// timeout, which also kills a spawned browser.
pub async fn fetch_with_timeout<F: Fetcher>(
    fetcher: &F,
    tick: u64,
    timeout: Duration,
) -> Result<ScheduleSnapshot, FetchError> {
    match tokio::time::timeout(timeout, fetcher.fetch(tick)).await {
        Ok(result) => result,
        Err(_) => TimeoutSnafu { after: timeout }.fail(),
    }
}

/// Tries `primary` first and `secondary` when it fails. The primary only
/// gets `primary_budget`, so a hung primary still leaves the secondary time
/// inside the caller's own timeout.
#[derive(Debug, Clone)]
pub struct Fallback<P, S> {
    primary: P,
    secondary: S,
    primary_budget: Duration,
}

impl<P, S> Fallback<P, S> {
    pub fn new(primary: P, secondary: S, primary_budget: Duration) -> Self {
        Self {
            primary,
            secondary,
            primary_budget,
        }
    }
}

impl<P: Fetcher, S: Fetcher> Fetcher for Fallback<P, S> {
    async fn fetch(&self, tick: u64) -> Result<ScheduleSnapshot, FetchError> {
        match fetch_with_timeout(&self.primary, tick, self.primary_budget).await {
            Ok(snapshot) => Ok(snapshot),
            Err(error) => {
                tracing::warn!(%error, "primary fetch failed, falling back");
                self.secondary.fetch(tick).await
            }
        }
    }
}

/// The fetcher selected by `KACKY_FETCH_MODE`.
#[derive(Debug, Clone)]
pub enum ScheduleFetcher {
    Http(HttpFetcher),
    Browser(BrowserFetcher),
    Auto(Fallback<BrowserFetcher, HttpFetcher>),
}

impl ScheduleFetcher {
    /// In `auto` mode the browser gets half of the request timeout and plain
    /// HTTP the rest.
    pub fn from_config(config: &Config, url: Url) -> Result<Self, FetchError> {
        let browser = || BrowserFetcher::new(&config.browser_path, url.clone(), &config.user_agent);
        let http = || HttpFetcher::new(url.clone(), &config.user_agent, config.request_timeout());

        let fetcher = match config.fetch_mode {
            FetchMode::Http => ScheduleFetcher::Http(http()?),
            FetchMode::Browser => ScheduleFetcher::Browser(browser()),
            FetchMode::Auto => {
                let budget = config.request_timeout() / 2;
                ScheduleFetcher::Auto(Fallback::new(browser(), http()?, budget))
            }
        };

        tracing::info!(mode = ?config.fetch_mode, %url, "schedule fetcher ready");
        Ok(fetcher)
    }
}

impl Fetcher for ScheduleFetcher {
    async fn fetch(&self, tick: u64) -> Result<ScheduleSnapshot, FetchError> {
        match self {
            ScheduleFetcher::Http(fetcher) => fetcher.fetch(tick).await,
            ScheduleFetcher::Browser(fetcher) => fetcher.fetch(tick).await,
            ScheduleFetcher::Auto(fetcher) => fetcher.fetch(tick).await,
        }
    }
}
