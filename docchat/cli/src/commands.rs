//! Input line parsing
//!
//! Plain lines are queries. Lines starting with `/` are client commands.

use std::path::PathBuf;

/// Text shown for `/help`
pub const HELP_TEXT: &str = "\
Type a question and press Enter.
  /attach <path>  send a document (.pdf .docx .doc .txt .md) with the next question
  /detach         drop the pending document
  /clear          delete conversation history
  /help           show this help
  /quit           exit";

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask a question (may be blank; the dispatcher ignores blank queries)
    Query(String),
    /// Attach a document to the next query
    Attach(PathBuf),
    /// Drop the pending attachment
    Detach,
    /// Clear history on the service and locally
    Clear,
    /// Show usage
    Help,
    /// Exit
    Quit,
}

/// Why a command line was not understood
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// `/attach` without a path
    MissingPath,
    /// Unrecognised `/command`
    Unknown(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPath => f.write_str("Usage: /attach <path>"),
            Self::Unknown(name) => write!(f, "Unknown command /{name} (try /help)"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Parse one input line
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Command::Query(line.trim_end_matches(['\r', '\n']).to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "attach" if arg.is_empty() => Err(CommandError::MissingPath),
        "attach" => Ok(Command::Attach(PathBuf::from(arg))),
        "detach" => Ok(Command::Detach),
        "clear" => Ok(Command::Clear),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
