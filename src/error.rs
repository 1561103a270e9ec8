use snafu::{Location, Snafu};

use crate::config::ConfigError;
use crate::fetcher::FetchError;
use crate::repl::ReplError;
use crate::watchlist::WatchlistError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ApplicationError {
    /// Could not load the configuration from the environment
    ConfigLoad {
        source: ConfigError,
        #[snafu(implicit)]
        location: Location,
    },

    /// `KACKY_LOG_LEVEL` is not a valid filter directive
    LogFilter {
        directive: String,
        source: tracing_subscriber::filter::ParseError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not initialize the logger
    InitializeLogger {
        source: tracing::subscriber::SetGlobalDefaultError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not read or watch the watchlist file
    Watchlist {
        source: WatchlistError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not build the schedule fetcher
    Fetcher {
        source: FetchError,
        #[snafu(implicit)]
        location: Location,
    },

    /// The interactive prompt failed
    Repl {
        source: ReplError,
        #[snafu(implicit)]
        location: Location,
    },

    /// The interactive prompt thread panicked
    ReplTask {
        source: tokio::task::JoinError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not listen for Ctrl-C
    Signal {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}
