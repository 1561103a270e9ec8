use super::*;
use chumsky::{error::SimpleReason, prelude::*, text::whitespace};
use itertools::Itertools;

#[derive(Debug, Snafu)]
#[snafu(display("cannot parse '{input}' - {}", self.combine_errors("\n")))]
pub struct ParseError {
    input: String,
    errors: Vec<Simple<char>>,
}

impl ParseError {
    fn combine_errors(&self, separator: &str) -> String {
        self.errors
            .iter()
            .map(|err| {
                let reason = match err.reason() {
                    SimpleReason::Custom(msg) => msg.clone(),
                    SimpleReason::Unexpected => "unexpected input".to_string(),
                    SimpleReason::Unclosed { span, delimiter } => {
                        format!("unclosed delimiter ({}..{}) in {}", span.start, span.end, delimiter)
                    }
                };
                format!("{err}:\n   {reason}")
            })
            .join(separator)
    }
}

pub fn parse(input: &str) -> Result<Action, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Action::None);
    }

    program().parse(input).map_err(|errors| ParseError {
        input: input.to_string(),
        errors,
    })
}

fn program() -> impl Parser<char, Action, Error = Simple<char>> {
    choice((
        action_add(),
        action_remove(),
        action_list(),
        action_status(),
        action_help(),
        action_exit(),
    ))
    .then_ignore(end())
}

fn action_add() -> impl Parser<char, Action, Error = Simple<char>> {
    just("add")
        .then_ignore(whitespace().at_least(1))
        .ignore_then(map_ids())
        .map(Action::Add)
}

fn action_remove() -> impl Parser<char, Action, Error = Simple<char>> {
    choice((just("remove"), just("rm")))
        .then_ignore(whitespace().at_least(1))
        .ignore_then(map_ids())
        .map(Action::Remove)
}

fn action_list() -> impl Parser<char, Action, Error = Simple<char>> {
    just("list").to(Action::List)
}

fn action_status() -> impl Parser<char, Action, Error = Simple<char>> {
    just("status").to(Action::Status)
}

fn action_help() -> impl Parser<char, Action, Error = Simple<char>> {
    choice((just("help"), just("?"))).to(Action::Help)
}

fn action_exit() -> impl Parser<char, Action, Error = Simple<char>> {
    choice((just("exit"), just("quit"))).to(Action::Exit)
}

/// Ids separated by whitespace and/or commas: `379 385` or `379, 385`.
fn map_ids() -> impl Parser<char, Vec<MapId>, Error = Simple<char>> {
    let comma = just(',').padded().ignored();
    let space = whitespace().at_least(1).ignored();

    map_id().separated_by(comma.or(space)).at_least(1)
}

fn map_id() -> impl Parser<char, MapId, Error = Simple<char>> {
    filter(char::is_ascii_digit)
        .repeated()
        .at_least(1)
        .try_map(|digits, span| {
            digits
                .into_iter()
                .collect::<String>()
                .parse::<MapId>()
                .map_err(|error| Simple::custom(span, error.to_string()))
        })
}
