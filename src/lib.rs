pub mod action_log;
pub mod automation;
pub mod control;
pub mod detection;
pub mod display;
pub mod extraction;
pub mod metrics;
pub mod models;
pub mod planning;
pub mod sensing;
pub mod settings;
pub mod utils;

#[cfg(feature = "native")]
mod console;

#[cfg(feature = "native")]
pub use console::run;

pub use control::{AgentController, AgentDeps, ControlState};
