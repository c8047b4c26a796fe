use std::str::FromStr;

use thiserror::Error;

use crate::source::RecordId;

// one line typed at the session prompt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    Search(String),
    Reset,
    Delete(RecordId),
    List,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{name}', type 'help' for the list")]
    Unknown { name: String },

    #[error("'delete' needs a record id")]
    MissingId,

    #[error("invalid record id '{raw}'")]
    InvalidId { raw: String },

    #[error("'{name}' takes no arguments")]
    UnexpectedArgument { name: String },
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandParseError::Empty);
        }
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (line, ""),
        };
        let name = name.to_lowercase();

        let bare = |cmd: Command| {
            if rest.is_empty() {
                Ok(cmd)
            } else {
                Err(CommandParseError::UnexpectedArgument { name: name.clone() })
            }
        };

        match name.as_str() {
            "next" | "n" => bare(Command::Next),
            "prev" | "p" => bare(Command::Prev),
            "search" | "s" => Ok(Command::Search(rest.to_string())),
            "reset" | "r" => bare(Command::Reset),
            "delete" | "d" | "del" => {
                if rest.is_empty() {
                    return Err(CommandParseError::MissingId);
                }
                let raw = rest.trim_start_matches("post-");
                raw.parse::<RecordId>()
                    .map(Command::Delete)
                    .map_err(|_| CommandParseError::InvalidId {
                        raw: rest.to_string(),
                    })
            }
            "list" | "l" | "ls" => bare(Command::List),
            "status" | "st" => bare(Command::Status),
            "help" | "h" | "?" => bare(Command::Help),
            "quit" | "q" | "exit" => bare(Command::Quit),
            _ => Err(CommandParseError::Unknown { name: name.clone() }),
        }
    }
}

pub fn help_text() -> &'static str {
    "commands:
  next, n            next page (ignored on the last page)
  prev, p            previous page (ignored on the first page)
  search, s <text>   search from the first page; no text lists everything
  reset, r           clear the search and reload the current page
  delete, d <id>     hide a listed record for the rest of the session
  list, l            print the current list again
  status             show page, total and hidden records
  help, h            this text
  quit, q            leave"
}
