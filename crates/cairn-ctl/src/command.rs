//! Keyboard command parsing.
//!
//! One request per line, verb first: `LOGRQ <username>`, `RRQ <file>`,
//! `WRQ <file>`, `DELRQ <file>`, `DIRQ`, `DISC`. The argument is the rest
//! of the line, so file names may contain spaces.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String },
    Read { filename: String },
    Write { filename: String },
    Delete { filename: String },
    List,
    Disconnect,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0} (expected LOGRQ, RRQ, WRQ, DELRQ, DIRQ, or DISC)")]
    Unknown(String),

    #[error("{0} requires an argument")]
    MissingArgument(&'static str),

    #[error("{0} takes no argument")]
    UnexpectedArgument(&'static str),

    // Arguments are zero-terminated on the wire.
    #[error("argument must not contain NUL bytes")]
    EmbeddedNul,
}

pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "" => Err(ParseError::Empty),
        "LOGRQ" => Ok(Command::Login {
            username: argument("LOGRQ", rest)?,
        }),
        "RRQ" => Ok(Command::Read {
            filename: argument("RRQ", rest)?,
        }),
        "WRQ" => Ok(Command::Write {
            filename: argument("WRQ", rest)?,
        }),
        "DELRQ" => Ok(Command::Delete {
            filename: argument("DELRQ", rest)?,
        }),
        "DIRQ" => no_argument("DIRQ", rest, Command::List),
        "DISC" => no_argument("DISC", rest, Command::Disconnect),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn argument(verb: &'static str, rest: &str) -> Result<String, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::MissingArgument(verb));
    }
    if rest.contains('\0') {
        return Err(ParseError::EmbeddedNul);
    }
    Ok(rest.to_string())
}

fn no_argument(verb: &'static str, rest: &str, cmd: Command) -> Result<Command, ParseError> {
    if rest.is_empty() {
        Ok(cmd)
    } else {
        Err(ParseError::UnexpectedArgument(verb))
    }
}
