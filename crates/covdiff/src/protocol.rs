//! Control Protocol
//!
//! One line per connection: `START <test-id>` or `END <test-id>`, answered
//! with `ACK` whatever the outcome.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Acknowledgement line sent for every handled request
pub const ACK: &str = "ACK";

/// Upper bound on a control line, newline included
pub const MAX_COMMAND_LEN: usize = 4096;

/// A parsed control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a coverage window for a test
    Start(String),
    /// Close the coverage window of a test and emit its report
    End(String),
}

/// Reasons a control line is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCommandError {
    /// Blank line
    #[error("empty command")]
    Empty,
    /// Action without a test identifier
    #[error("{action} requires a test id")]
    MissingId {
        /// The action that was sent
        action: String,
    },
    /// Action other than START or END
    #[error("unknown action {action:?}")]
    UnknownAction {
        /// The action that was sent
        action: String,
    },
}

impl Command {
    /// Parse one control line (surrounding whitespace ignored)
    ///
    /// The action is the first word; the test id is the rest of the line,
    /// so ids may contain spaces.
    pub fn parse(line: &str) -> Result<Self, ParseCommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseCommandError::Empty);
        }
        let (action, id) = line.split_once(' ').unwrap_or((line, ""));
        let id = id.trim();
        let build = match action {
            "START" => Self::Start,
            "END" => Self::End,
            _ => {
                return Err(ParseCommandError::UnknownAction {
                    action: action.to_string(),
                })
            }
        };
        if id.is_empty() {
            return Err(ParseCommandError::MissingId {
                action: action.to_string(),
            });
        }
        Ok(build(id.to_string()))
    }

    /// Wire name of the action
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Start(_) => "START",
            Self::End(_) => "END",
        }
    }

    /// Test identifier carried by the command
    #[must_use]
    pub fn test_id(&self) -> &str {
        match self {
            Self::Start(id) | Self::End(id) => id,
        }
    }

    /// Newline-terminated wire form
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action(), self.test_id())
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_and_end() {
        assert_eq!(
            Command::parse("START t1\n"),
            Ok(Command::Start("t1".to_string()))
        );
        assert_eq!(Command::parse("END t1"), Ok(Command::End("t1".to_string())));
    }

    #[test]
    fn test_id_keeps_inner_spaces() {
        let cmd: Command = "START test-set-0 / test-3".parse().unwrap();
        assert_eq!(cmd.test_id(), "test-set-0 / test-3");
    }

    #[test]
    fn test_empty_line_is_malformed() {
        assert_eq!(Command::parse("   \n"), Err(ParseCommandError::Empty));
    }

    #[test]
    fn test_missing_id_is_malformed() {
        assert_eq!(
            Command::parse("END"),
            Err(ParseCommandError::MissingId {
                action: "END".to_string()
            })
        );
        assert!(Command::parse("START   ").is_err());
    }

    #[test]
    fn test_unknown_action_is_malformed() {
        let err = Command::parse("PAUSE t1").unwrap_err();
        assert!(err.to_string().contains("PAUSE"));
        // Actions are case-sensitive
        assert!(Command::parse("start t1").is_err());
    }

    #[test]
    fn test_wire_form() {
        assert_eq!(Command::End("t7".to_string()).to_line(), "END t7\n");
    }
}
