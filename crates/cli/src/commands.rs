//! Console commands accepted on stdin while a batch runs.

use std::str::FromStr;

use retro2mp4_core::ItemId;

/// Help text printed by `help` and on unknown input.
pub const HELP: &str = "\
Commands:
  pause        stop pulling new files, the current one finishes
  resume       continue with the next queued file
  stop         abandon the current file and end the run
  remove <id>  drop a file from the queue
  status       show scheduler state and queue counts
  failed       show the failed list so far
  log          show where the run log is written
  help         show this text";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Stop,
    Remove(ItemId),
    Status,
    Failed,
    Log,
    Help,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}', type 'help' for the list")]
    Unknown(String),

    #[error("'remove' needs an item id, e.g. 'remove 3'")]
    MissingId,

    #[error("'{0}' is not a valid item id")]
    InvalidId(String),
}

impl FromStr for ConsoleCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandParseError::Empty);
        };

        match verb.to_lowercase().as_str() {
            "pause" | "p" => Ok(Self::Pause),
            "resume" | "r" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "remove" | "rm" => {
                let id = words.next().ok_or(CommandParseError::MissingId)?;
                id.parse()
                    .map(Self::Remove)
                    .map_err(|_| CommandParseError::InvalidId(id.to_string()))
            }
            "status" | "s" => Ok(Self::Status),
            "failed" => Ok(Self::Failed),
            "log" => Ok(Self::Log),
            "help" | "?" => Ok(Self::Help),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("pause".parse(), Ok(ConsoleCommand::Pause));
        assert_eq!("  RESUME \n".parse(), Ok(ConsoleCommand::Resume));
        assert_eq!("stop".parse(), Ok(ConsoleCommand::Stop));
        assert_eq!("s".parse(), Ok(ConsoleCommand::Status));
        assert_eq!("?".parse(), Ok(ConsoleCommand::Help));
    }

    #[test]
    fn test_parse_remove() {
        assert_eq!("remove 12".parse(), Ok(ConsoleCommand::Remove(12)));
        assert_eq!("rm 3".parse(), Ok(ConsoleCommand::Remove(3)));
        assert_eq!(
            "remove".parse::<ConsoleCommand>(),
            Err(CommandParseError::MissingId)
        );
        assert_eq!(
            "remove abc".parse::<ConsoleCommand>(),
            Err(CommandParseError::InvalidId("abc".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert_eq!("   ".parse::<ConsoleCommand>(), Err(CommandParseError::Empty));
        let err = "fly".parse::<ConsoleCommand>().unwrap_err();
        assert!(err.to_string().contains("'fly'"));
    }
}
