mod commands;
mod controller;
mod state;

pub use commands::{Command, CommandError, HELP};
pub use controller::{AgentController, AgentDeps};
pub use state::{ControlMachine, ControlState, TransitionError};
