pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod logger;
pub mod model;
pub mod parser;
pub mod persist;
pub mod repl;
pub mod sink;
pub mod time;
pub mod watcher;
pub mod watchlist;
