use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::models::Key;

use super::EmergencyStop;

/// The only path from this crate to real input devices.
///
/// Implementations perform one atomic action per call and return an error
/// instead of leaving keys half-pressed where they can.
pub trait InputDevice: Send {
    fn press_key(&mut self, key: Key) -> Result<()>;
    /// Holds the modifiers in order, taps the last key, releases in reverse.
    fn hotkey(&mut self, keys: &[Key]) -> Result<()>;
    fn type_text(&mut self, text: &str) -> Result<()>;
    fn move_pointer(&mut self, x: i32, y: i32) -> Result<()>;
    /// Releases every key that might still be held.
    fn release_all(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum InputAction {
    PressKey { key: Key },
    Hotkey { keys: Vec<Key> },
    TypeText { text: String },
    MovePointer { x: i32, y: i32 },
    ReleaseAll,
}

impl InputAction {
    fn counts_as_step(&self) -> bool {
        !matches!(self, InputAction::MovePointer { .. } | InputAction::ReleaseAll)
    }
}

/// Input device that records actions instead of injecting them.
///
/// Used for dry runs and in tests. It can be scripted to fail the n-th step
/// action or to raise the emergency stop right after the n-th step action.
#[derive(Clone, Default)]
pub struct RecordingInput {
    actions: Arc<Mutex<Vec<InputAction>>>,
    fail_on_step: Option<usize>,
    trip_after_step: Option<(usize, EmergencyStop)>,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1-based index of the step action that should error.
    pub fn failing_on_step(mut self, step: usize) -> Self {
        self.fail_on_step = Some(step);
        self
    }

    /// Raises `stop` once the given number of step actions have completed.
    pub fn tripping_stop_after(mut self, steps: usize, stop: EmergencyStop) -> Self {
        self.trip_after_step = Some((steps, stop));
        self
    }

    pub fn actions(&self) -> Vec<InputAction> {
        self.lock().clone()
    }

    pub fn step_actions(&self) -> Vec<InputAction> {
        self.lock()
            .iter()
            .filter(|action| action.counts_as_step())
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<InputAction>> {
        match self.actions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&mut self, action: InputAction) -> Result<()> {
        let counts = action.counts_as_step();
        let mut actions = self.lock();
        if counts {
            let number = actions.iter().filter(|a| a.counts_as_step()).count() + 1;
            if self.fail_on_step == Some(number) {
                return Err(anyhow!("simulated input failure on action {number}"));
            }
            actions.push(action);
            if let Some((after, stop)) = &self.trip_after_step {
                if *after == number {
                    stop.trigger();
                }
            }
        } else {
            actions.push(action);
        }
        Ok(())
    }
}

impl InputDevice for RecordingInput {
    fn press_key(&mut self, key: Key) -> Result<()> {
        self.record(InputAction::PressKey { key })
    }

    fn hotkey(&mut self, keys: &[Key]) -> Result<()> {
        self.record(InputAction::Hotkey {
            keys: keys.to_vec(),
        })
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        self.record(InputAction::TypeText {
            text: text.to_string(),
        })
    }

    fn move_pointer(&mut self, x: i32, y: i32) -> Result<()> {
        self.record(InputAction::MovePointer { x, y })
    }

    fn release_all(&mut self) -> Result<()> {
        self.record(InputAction::ReleaseAll)
    }
}
