//! Delivery of went-live events.
//!
//! A failed delivery is logged by the caller and never undoes the
//! notification flag on the entry.

use std::future::Future;

use snafu::{ResultExt, Snafu};
use tokio::process::Command;

use crate::model::LiveEvent;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SinkError {
    #[snafu(display("could not run notifier `{program}`: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: &LiveEvent) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Prints the event line to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    async fn deliver(&self, event: &LiveEvent) -> Result<(), SinkError> {
        println!("{event}");
        Ok(())
    }
}

/// Runs a desktop notifier such as `notify-send <title> <body>`.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
}

impl CommandSink {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl NotificationSink for CommandSink {
    async fn deliver(&self, event: &LiveEvent) -> Result<(), SinkError> {
        let body = match &event.server {
            Some(server) => format!("Map #{} is live on {server}", event.map),
            None => format!("Map #{} is live", event.map),
        };

        let mut child = Command::new(&self.program)
            .arg("Kacky map live")
            .arg(body)
            .stdin(std::process::Stdio::null())
            .spawn()
            .context(SpawnSnafu {
                program: self.program.clone(),
            })?;

        let program = self.program.clone();
        let map = event.map;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => tracing::warn!(%program, %status, map.id = %map, "notifier failed"),
                Err(error) => tracing::warn!(%program, %error, map.id = %map, "notifier failed"),
            }
        });

        Ok(())
    }
}

impl<S: NotificationSink> NotificationSink for Option<S> {
    async fn deliver(&self, event: &LiveEvent) -> Result<(), SinkError> {
        match self {
            Some(sink) => sink.deliver(event).await,
            None => Ok(()),
        }
    }
}

/// Delivers to both; the second still runs when the first fails.
impl<A: NotificationSink, B: NotificationSink> NotificationSink for (A, B) {
    async fn deliver(&self, event: &LiveEvent) -> Result<(), SinkError> {
        let first = self.0.deliver(event).await;
        let second = self.1.deliver(event).await;
        first.and(second)
    }
}
