//! Chat command parsing.
//!
//! A line is a command only when it starts with the configured prefix; every
//! other line is chatter and is ignored. Arguments are split on whitespace,
//! with double quotes grouping names that contain spaces:
//!
//! ```text
//! /new_ch standup "Team A"
//! /join leaf-7
//! ```

use thiserror::Error;
use transient_runtime::LeafId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    NewChannel { name: String, group: Option<String> },
    Join(LeafId),
    Leave(LeafId),
    List,
    Sweep,
    Help,
    Quit,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a channel id")]
    BadLeafId(String),
    #[error("unterminated quote")]
    UnterminatedQuote,
}

const NEW_CH_USAGE: &str = "new_ch <name> [category]";
const JOIN_USAGE: &str = "join <channel id>";
const LEAVE_USAGE: &str = "leave <channel id>";

/// `None` when `line` is not addressed to us.
pub fn parse(prefix: &str, line: &str) -> Option<Result<Command, ParseError>> {
    let body = line.trim().strip_prefix(prefix)?;
    Some(parse_body(body))
}

fn parse_body(body: &str) -> Result<Command, ParseError> {
    let words = split_words(body)?;
    let Some((name, args)) = words.split_first() else {
        return Err(ParseError::Unknown(String::new()));
    };
    match (name.as_str(), args) {
        ("new_ch", [leaf]) => Ok(Command::NewChannel {
            name: leaf.clone(),
            group: None,
        }),
        // Words after the category are ignored.
        ("new_ch", [leaf, group, ..]) => Ok(Command::NewChannel {
            name: leaf.clone(),
            group: Some(group.clone()),
        }),
        ("new_ch", _) => Err(ParseError::Usage(NEW_CH_USAGE)),
        ("join", [id]) => leaf_id(id).map(Command::Join),
        ("join", _) => Err(ParseError::Usage(JOIN_USAGE)),
        ("leave", [id]) => leaf_id(id).map(Command::Leave),
        ("leave", _) => Err(ParseError::Usage(LEAVE_USAGE)),
        ("list", []) => Ok(Command::List),
        ("sweep", []) => Ok(Command::Sweep),
        ("help", _) => Ok(Command::Help),
        ("quit", []) => Ok(Command::Quit),
        (other, _) => Err(ParseError::Unknown(other.to_string())),
    }
}

fn leaf_id(raw: &str) -> Result<LeafId, ParseError> {
    raw.strip_prefix("leaf-")
        .unwrap_or(raw)
        .parse::<u64>()
        .map(LeafId)
        .map_err(|_| ParseError::BadLeafId(raw.to_string()))
}

fn split_words(input: &str) -> Result<Vec<String>, ParseError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quoted {
        return Err(ParseError::UnterminatedQuote);
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

pub const HELP: &str = "\
commands:
  new_ch <name> [category]  create a temporary channel
  join <channel id>         add an occupant
  leave <channel id>        remove an occupant
  list                      show channels and their categories
  sweep                     re-arm every pending check
  quit                      shut down";
