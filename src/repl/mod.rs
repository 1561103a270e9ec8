//! Interactive prompt. Edits are queued for the watcher, which applies them
//! at the start of its next tick and writes the watchlist file.

use itertools::Itertools;
use rustyline::{history::MemHistory, Editor};
use snafu::{ensure, ResultExt, Snafu};
use tokio::sync::mpsc::UnboundedSender;

use crate::{console, model::MapId, time, watcher::Snapshots, watchlist::WatchlistEdit};

mod parse;

const HELP: &str = "commands: add <ids..>, remove <ids..>, list, status, exit";

pub struct Repl {
    inner: Editor<(), MemHistory>,
    message: Option<String>,
}

impl Repl {
    pub fn new() -> Result<Self, ReplError> {
        let config = rustyline::Config::default();
        let inner =
            rustyline::Editor::with_history(config, MemHistory::new()).context(RustylineSnafu)?;

        let repl = Self {
            inner,
            message: None,
        };
        Ok(repl)
    }

    /// Blocks until a line is entered. End of input and Ctrl-C both exit.
    pub fn prompt(&mut self) -> Action {
        let message = self
            .message
            .as_ref()
            .map(|msg| format!("  {msg}\n"))
            .unwrap_or_default();
        let prompt = format!("{message}kacky> ");

        let Ok(input) = self.inner.readline(&prompt) else {
            return Action::Exit;
        };

        self.message = None;

        self.inner.add_history_entry(input.clone()).ok();

        match parse::parse(&input) {
            Ok(action) => action,
            Err(err) => {
                self.reply(err.to_string());
                Action::None
            }
        }
    }

    pub fn reply(&mut self, message: String) {
        if let Some(msg) = self.message.as_mut() {
            msg.push('\n');
            msg.push_str(&message);
        } else {
            self.message = Some(message);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Action {
    Add(Vec<MapId>),
    Remove(Vec<MapId>),
    List,
    Status,
    Help,
    Exit,
    None,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReplError {
    #[snafu(display("failed to initialize REPL: {}", source))]
    Rustyline {
        source: rustyline::error::ReadlineError,
    },

    #[snafu(display("the watcher is no longer running"))]
    Closed,
}

/// Run the prompt until `exit`. Blocking; call from a dedicated thread.
pub fn start(
    repl: &mut Repl,
    edits: &UnboundedSender<WatchlistEdit>,
    snapshots: &Snapshots,
) -> Result<(), ReplError> {
    tracing::info!("starting REPL");

    loop {
        match repl.prompt() {
            Action::Exit => break,
            Action::None => continue,
            action => {
                let reply = respond(action, edits, snapshots)?;
                repl.reply(reply);
            }
        }
    }

    Ok(())
}

fn respond(
    action: Action,
    edits: &UnboundedSender<WatchlistEdit>,
    snapshots: &Snapshots,
) -> Result<String, ReplError> {
    let reply = match action {
        Action::Add(ids) => {
            let reply = format!("adding {}", ids.iter().join(", "));
            ensure!(edits.send(WatchlistEdit::Add(ids)).is_ok(), ClosedSnafu);
            reply
        }
        Action::Remove(ids) => {
            let reply = format!("removing {}", ids.iter().join(", "));
            ensure!(edits.send(WatchlistEdit::Remove(ids)).is_ok(), ClosedSnafu);
            reply
        }
        Action::List => console::watchlist(&snapshots.borrow()),
        Action::Status => console::summary(&snapshots.borrow(), time::now()),
        Action::Help | Action::Exit | Action::None => HELP.to_string(),
    };

    Ok(reply)
}
