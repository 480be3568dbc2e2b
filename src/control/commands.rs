use std::str::FromStr;

use thiserror::Error;

use crate::models::Key;

pub const HELP: &str = "\
Commands:
  displays            list connected monitors
  start [ids...]      start monitoring (no ids: default set, or all)
  stop                stop monitoring
  arm                 allow automation for this monitoring session
  disarm              withdraw automation consent
  estop               emergency stop (also Ctrl+C)
  request <text>      plan and run a request, e.g. request fix the error
  key <combo>         press one key or a combo while armed, e.g. key ctrl+s
  state               show the control state
  metrics             show pipeline counters and process usage
  help                show this text
  quit                shut down and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Displays,
    Start(Vec<u32>),
    Stop,
    Arm,
    Disarm,
    EmergencyStop,
    Request(String),
    Key(Vec<Key>),
    State,
    Metrics,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("no command given")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{0}' is not a monitor id")]
    BadMonitorId(String),
    #[error("usage: request <text>")]
    MissingRequestText,
    #[error("bad key combo: {0}")]
    BadKeyCombo(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_lowercase().as_str() {
            "" => return Err(CommandError::Empty),
            "displays" | "monitors" => Command::Displays,
            "start" => Command::Start(
                rest.split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|id| !id.is_empty())
                    .map(|id| {
                        id.parse::<u32>()
                            .map_err(|_| CommandError::BadMonitorId(id.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            "stop" => Command::Stop,
            "arm" => Command::Arm,
            "disarm" => Command::Disarm,
            "estop" | "panic" => Command::EmergencyStop,
            "request" | "do" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingRequestText);
                }
                Command::Request(rest.to_string())
            }
            "key" | "keys" => Command::Key(
                Key::parse_combo(rest).map_err(|err| CommandError::BadKeyCombo(err.to_string()))?,
            ),
            "state" | "status" => Command::State,
            "metrics" => Command::Metrics,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(CommandError::Unknown(word.to_string())),
        };
        Ok(command)
    }
}
