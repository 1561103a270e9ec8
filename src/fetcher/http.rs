use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use snafu::ResultExt;
use tracing::instrument;
use url::Url;

use crate::model::ScheduleSnapshot;
use crate::parser::parse_schedule;

use super::{FetchError, Fetcher, HttpClientSnafu, NetworkSnafu, ParseSnafu};

/// Plain GET of the schedule page. Works as long as the page is served
/// pre-rendered.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpFetcher {
    pub fn new(url: Url, user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context(HttpClientSnafu)?;

        Ok(Self { client, url })
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_html(&self) -> Result<String, FetchError> {
        let url = self.url.clone();

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(NetworkSnafu { url: url.clone() })?;

        let html = response.text().await.context(NetworkSnafu { url })?;
        tracing::debug!(bytes = html.len(), "schedule page received");

        Ok(html)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, tick: u64) -> Result<ScheduleSnapshot, FetchError> {
        let html = self.fetch_html().await?;
        parse_schedule(&html, tick).context(ParseSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_custom_agent() {
        let url = Url::parse("https://kacky.gg/schedule").unwrap();
        let fetcher = HttpFetcher::new(url, "TestBot/1.0", Duration::from_secs(5));
        assert!(fetcher.is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let url = Url::parse("http://127.0.0.1:9/schedule").unwrap();
        let fetcher = HttpFetcher::new(url, "TestBot/1.0", Duration::from_secs(2)).unwrap();

        let error = fetcher.fetch(0).await.unwrap_err();
        assert!(matches!(error, FetchError::Network { .. }), "{error}");
    }
}
