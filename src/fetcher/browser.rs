use std::path::{Path, PathBuf};

use snafu::{ensure, ResultExt};
use tokio::process::Command;
use tracing::instrument;
use url::Url;

use crate::model::ScheduleSnapshot;
use crate::parser::parse_schedule;

use super::{BrowserExitSnafu, BrowserSnafu, FetchError, Fetcher, ParseSnafu};

/// Renders the schedule page with a headless Chromium-compatible browser and
/// reads the resulting DOM from its stdout.
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    program: PathBuf,
    url: Url,
    user_agent: String,
}

impl BrowserFetcher {
    pub fn new(program: &Path, url: Url, user_agent: &str) -> Self {
        Self {
            program: program.to_path_buf(),
            url,
            user_agent: user_agent.to_string(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg(format!("--user-agent={}", self.user_agent))
            .arg("--dump-dom")
            .arg(self.url.as_str())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        command
    }

    #[instrument(skip(self), fields(program = %self.program.display()))]
    pub async fn fetch_html(&self) -> Result<String, FetchError> {
        let program = self.program.display().to_string();

        let output = self
            .command()
            .output()
            .await
            .context(BrowserSnafu {
                program: program.clone(),
            })?;

        ensure!(
            output.status.success(),
            BrowserExitSnafu {
                program,
                status: output.status,
                stderr: last_line(&output.stderr),
            }
        );

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(bytes = html.len(), "rendered schedule page received");

        Ok(html)
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, tick: u64) -> Result<ScheduleSnapshot, FetchError> {
        let html = self.fetch_html().await?;
        parse_schedule(&html, tick).context(ParseSnafu)
    }
}

fn last_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}
