use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use snafu::{ensure, ResultExt, Snafu};
use url::Url;

use crate::engine::EngineConfig;

pub const DEFAULT_SCHEDULE_URL: &str = "https://kacky.gg/schedule";
pub const DEFAULT_USER_AGENT: &str = "KackyWatcher/1.0 (+https://kacky.gg/schedule)";

const ENV_PREFIX: &str = "KACKY_";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// a variable is present but could not be parsed, e.g. a malformed number
    #[snafu(display("could not read configuration from the environment: {source}"))]
    Load { source: envy::Error },

    #[snafu(display("invalid setting `{field}`: {reason}"))]
    Invalid { field: &'static str, reason: String },
}

/// How the schedule page is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Plain HTTP GET.
    Http,
    /// Headless browser dump of the rendered page.
    Browser,
    /// Headless browser first, plain HTTP when the browser fails.
    #[default]
    Auto,
}

/// Runtime settings, read from `KACKY_*` environment variables (and `.env`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    pub unknown_retry_seconds: u64,
    pub max_staleness_seconds: u64,
    pub live_duration_seconds: u64,
    pub eta_proximity_fetch_threshold_seconds: Option<u64>,
    pub live_resync_seconds: Option<u64>,

    pub fetch_mode: FetchMode,
    pub schedule_url: String,
    pub user_agent: String,
    pub browser_path: PathBuf,

    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub notify_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 1,
            request_timeout_seconds: 10,
            unknown_retry_seconds: 60,
            max_staleness_seconds: 300,
            live_duration_seconds: 600,
            eta_proximity_fetch_threshold_seconds: None,
            live_resync_seconds: None,

            fetch_mode: FetchMode::default(),
            schedule_url: DEFAULT_SCHEDULE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            browser_path: PathBuf::from("chromium"),

            data_dir: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            notify_command: None,
        }
    }
}

/// Load and validate the configuration. Any error here is fatal.
pub fn load() -> Result<Config, ConfigError> {
    let config = Config::from_env()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<Config>()
            .context(LoadSnafu)
    }

    pub fn from_vars<I>(vars: I) -> Result<Config, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter::<_, Config>(vars)
            .context(LoadSnafu)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("poll_interval_seconds", self.poll_interval_seconds)?;
        ensure_positive("request_timeout_seconds", self.request_timeout_seconds)?;
        ensure_positive("unknown_retry_seconds", self.unknown_retry_seconds)?;
        ensure_positive("live_duration_seconds", self.live_duration_seconds)?;

        ensure!(
            self.max_staleness_seconds >= self.poll_interval_seconds,
            InvalidSnafu {
                field: "max_staleness_seconds",
                reason: format!(
                    "must be at least the poll interval ({}s)",
                    self.poll_interval_seconds
                ),
            }
        );

        if let Some(threshold) = self.eta_proximity_fetch_threshold_seconds {
            ensure_positive("eta_proximity_fetch_threshold_seconds", threshold)?;
        }

        if let Some(delay) = self.live_resync_seconds {
            ensure_positive("live_resync_seconds", delay)?;
        }

        self.schedule_url()?;
        Ok(())
    }

    pub fn schedule_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.schedule_url).map_err(|error| ConfigError::Invalid {
            field: "schedule_url",
            reason: error.to_string(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn watchlist_path(&self) -> PathBuf {
        self.data_dir.join("watchlist.txt")
    }

    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join("map_status.json")
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            tick_seconds: self.poll_interval_seconds,
            request_timeout: self.request_timeout(),
            unknown_retry_seconds: self.unknown_retry_seconds,
            max_staleness_seconds: self.max_staleness_seconds,
            live_duration_seconds: self.live_duration_seconds,
            eta_proximity_threshold_seconds: self.eta_proximity_fetch_threshold_seconds,
            live_resync_seconds: self.live_resync_seconds,
        }
    }
}

fn ensure_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    ensure!(
        value > 0,
        InvalidSnafu {
            field,
            reason: "must be greater than zero",
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_vars(Vec::new()).unwrap();

        assert_eq!(config.poll_interval_seconds, 1);
        assert_eq!(config.request_timeout_seconds, 10);
        assert_eq!(config.unknown_retry_seconds, 60);
        assert_eq!(config.max_staleness_seconds, 300);
        assert_eq!(config.live_duration_seconds, 600);
        assert_eq!(config.eta_proximity_fetch_threshold_seconds, None);
        assert_eq!(config.live_resync_seconds, None);
        assert_eq!(config.fetch_mode, FetchMode::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_prefixed_variables() {
        let config = Config::from_vars(vars(&[
            ("KACKY_POLL_INTERVAL_SECONDS", "2"),
            ("KACKY_FETCH_MODE", "http"),
            ("KACKY_ETA_PROXIMITY_FETCH_THRESHOLD_SECONDS", "30"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.poll_interval_seconds, 2);
        assert_eq!(config.fetch_mode, FetchMode::Http);
        assert_eq!(config.eta_proximity_fetch_threshold_seconds, Some(30));
        assert_eq!(config.engine().tick_seconds, 2);
    }

    #[test]
    fn malformed_number_fails_to_load() {
        let result = Config::from_vars(vars(&[("KACKY_REQUEST_TIMEOUT_SECONDS", "ten")]));
        assert!(matches!(result, Err(ConfigError::Load { .. })));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let config = Config {
            poll_interval_seconds: 0,
            ..Config::default()
        };

        let error = config.validate().unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "poll_interval_seconds",
                ..
            }
        ));
    }

    #[test]
    fn staleness_shorter_than_interval_is_invalid() {
        let config = Config {
            poll_interval_seconds: 10,
            max_staleness_seconds: 5,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_schedule_url_is_invalid() {
        let config = Config {
            schedule_url: "not a url".to_string(),
            ..Config::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "schedule_url",
                ..
            })
        ));
    }

    #[test]
    fn live_resync_is_opt_in() {
        let config = Config::from_vars(vars(&[("KACKY_LIVE_RESYNC_SECONDS", "90")])).unwrap();

        assert_eq!(config.live_resync_seconds, Some(90));
        assert_eq!(config.engine().policy().live_resync_seconds, Some(90));
        assert!(config.validate().is_ok());

        let disabled = Config {
            live_resync_seconds: Some(0),
            ..Config::default()
        };
        assert!(matches!(
            disabled.validate(),
            Err(ConfigError::Invalid {
                field: "live_resync_seconds",
                ..
            })
        ));
    }
}
