use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Mutex, MutexGuard,
    },
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    action_log::ActionLog,
    automation::{EmergencyStop, Refusal},
    models::LogKind,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum ControlState {
    Idle = 0,
    Monitoring = 1,
    AutomationArmed = 2,
    Executing = 3,
    EmergencyStopped = 4,
}

impl Default for ControlState {
    fn default() -> Self {
        ControlState::Idle
    }
}

impl ControlState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ControlState::Monitoring,
            2 => ControlState::AutomationArmed,
            3 => ControlState::Executing,
            4 => ControlState::EmergencyStopped,
            _ => ControlState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlState::Idle => "Idle",
            ControlState::Monitoring => "Monitoring",
            ControlState::AutomationArmed => "AutomationArmed",
            ControlState::Executing => "Executing",
            ControlState::EmergencyStopped => "EmergencyStopped",
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("monitoring is already active")]
    AlreadyMonitoring,
    #[error("monitoring is not active")]
    NotMonitoring,
    #[error("automation is not armed")]
    NotArmed,
    #[error("a plan is executing; use the emergency stop to halt it")]
    ExecutionInProgress,
    #[error("emergency stop is in effect; re-arm to continue")]
    EmergencyStopped,
}

/// Single source of truth for the agent mode.
///
/// Reads are lock-free atomic loads. Writers serialize on `transition` so a
/// check-then-set never interleaves with another writer; the emergency stop
/// flag itself is raised before that lock is taken.
pub struct ControlMachine {
    state: AtomicU8,
    monitoring: AtomicBool,
    stop: EmergencyStop,
    transition: Mutex<()>,
    log: ActionLog,
}

impl ControlMachine {
    pub fn new(log: ActionLog) -> Self {
        Self {
            state: AtomicU8::new(ControlState::Idle as u8),
            monitoring: AtomicBool::new(false),
            stop: EmergencyStop::new(),
            transition: Mutex::new(()),
            log,
        }
    }

    pub fn state(&self) -> ControlState {
        ControlState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub fn emergency_stop_handle(&self) -> EmergencyStop {
        self.stop.clone()
    }

    pub fn is_stop_triggered(&self) -> bool {
        self.stop.is_triggered()
    }

    pub fn start_monitoring(&self) -> Result<ControlState, TransitionError> {
        let _guard = self.lock();
        match self.state() {
            ControlState::Idle => {
                self.monitoring.store(true, Ordering::SeqCst);
                Ok(self.set(ControlState::Idle, ControlState::Monitoring))
            }
            ControlState::EmergencyStopped => {
                if self.monitoring.swap(true, Ordering::SeqCst) {
                    return Err(TransitionError::AlreadyMonitoring);
                }
                self.log.append(
                    LogKind::Transition,
                    "Monitoring resumed; emergency stop still in effect",
                );
                Ok(ControlState::EmergencyStopped)
            }
            _ => Err(TransitionError::AlreadyMonitoring),
        }
    }

    /// Ends the monitoring session. Automation consent never survives this.
    pub fn stop_monitoring(&self) -> Result<ControlState, TransitionError> {
        let _guard = self.lock();
        match self.state() {
            from @ (ControlState::Monitoring | ControlState::AutomationArmed) => {
                self.monitoring.store(false, Ordering::SeqCst);
                if from == ControlState::AutomationArmed {
                    self.log
                        .append(LogKind::Transition, "Automation consent revoked");
                }
                Ok(self.set(from, ControlState::Idle))
            }
            ControlState::Executing => Err(TransitionError::ExecutionInProgress),
            ControlState::EmergencyStopped => {
                if !self.monitoring.swap(false, Ordering::SeqCst) {
                    return Err(TransitionError::NotMonitoring);
                }
                self.log.append(
                    LogKind::Transition,
                    "Monitoring stopped; emergency stop still in effect",
                );
                Ok(ControlState::EmergencyStopped)
            }
            ControlState::Idle => Err(TransitionError::NotMonitoring),
        }
    }

    /// Grants automation consent for the current monitoring session. From
    /// `EmergencyStopped` this is the explicit re-arm that clears the stop.
    pub fn arm_automation(&self) -> Result<ControlState, TransitionError> {
        let _guard = self.lock();
        match self.state() {
            ControlState::Monitoring => {
                Ok(self.set(ControlState::Monitoring, ControlState::AutomationArmed))
            }
            ControlState::AutomationArmed => Ok(ControlState::AutomationArmed),
            ControlState::EmergencyStopped => {
                if !self.is_monitoring() {
                    return Err(TransitionError::NotMonitoring);
                }
                self.stop.clear();
                self.log
                    .append(LogKind::Transition, "Emergency stop cleared by user re-arm");
                Ok(self.set(
                    ControlState::EmergencyStopped,
                    ControlState::AutomationArmed,
                ))
            }
            ControlState::Executing => Err(TransitionError::ExecutionInProgress),
            ControlState::Idle => Err(TransitionError::NotMonitoring),
        }
    }

    pub fn disarm_automation(&self) -> Result<ControlState, TransitionError> {
        let _guard = self.lock();
        match self.state() {
            ControlState::AutomationArmed => {
                Ok(self.set(ControlState::AutomationArmed, ControlState::Monitoring))
            }
            ControlState::Monitoring => Ok(ControlState::Monitoring),
            ControlState::Executing => Err(TransitionError::ExecutionInProgress),
            ControlState::EmergencyStopped => Err(TransitionError::EmergencyStopped),
            ControlState::Idle => Err(TransitionError::NotMonitoring),
        }
    }

    /// Raises the stop flag first, then moves any non-executing state straight
    /// to `EmergencyStopped`. A running plan observes the flag at its next
    /// check and makes the transition itself after the safe reset.
    pub fn emergency_stop(&self) -> ControlState {
        let newly_raised = self.stop.trigger();
        let _guard = self.lock();
        match self.state() {
            ControlState::Executing => {
                if newly_raised {
                    self.log.append(
                        LogKind::SafetyStop,
                        "Emergency stop requested; halting before the next step",
                    );
                }
                ControlState::Executing
            }
            ControlState::EmergencyStopped => ControlState::EmergencyStopped,
            from => {
                self.log.append(LogKind::SafetyStop, "Emergency stop engaged");
                self.set(from, ControlState::EmergencyStopped)
            }
        }
    }

    pub(crate) fn begin_execution(&self) -> Result<(), Refusal> {
        let _guard = self.lock();
        if self.stop.is_triggered() {
            return Err(Refusal::EmergencyStopActive);
        }
        match self.state() {
            ControlState::AutomationArmed => {
                self.set(ControlState::AutomationArmed, ControlState::Executing);
                Ok(())
            }
            ControlState::Executing => Err(Refusal::AlreadyExecuting),
            ControlState::EmergencyStopped => Err(Refusal::EmergencyStopActive),
            other => Err(Refusal::NotArmed(other)),
        }
    }

    /// Leaves `Executing` for the resting state. Consent is consumed by the
    /// plan. If the stop was raised meanwhile the result is `EmergencyStopped`
    /// and the caller owes a safe reset.
    pub(crate) fn finish_execution(&self) -> ControlState {
        let _guard = self.lock();
        if self.stop.is_triggered() {
            return self.set(self.state(), ControlState::EmergencyStopped);
        }
        let resting = if self.is_monitoring() {
            ControlState::Monitoring
        } else {
            ControlState::Idle
        };
        self.set(ControlState::Executing, resting)
    }

    pub(crate) fn enter_emergency_stopped(&self) -> ControlState {
        let _guard = self.lock();
        self.set(self.state(), ControlState::EmergencyStopped)
    }

    /// Feature closed: everything back to `Idle`, flag cleared. Refused while
    /// a plan is executing; the stop stays raised until the executor has
    /// halted and reset the input.
    pub(crate) fn reset(&self) -> bool {
        let _guard = self.lock();
        if self.state() == ControlState::Executing {
            self.stop.trigger();
            return false;
        }
        self.monitoring.store(false, Ordering::SeqCst);
        self.stop.clear();
        self.set(self.state(), ControlState::Idle);
        true
    }

    fn set(&self, from: ControlState, to: ControlState) -> ControlState {
        self.state.store(to as u8, Ordering::SeqCst);
        if from != to {
            self.log
                .append(LogKind::Transition, format!("{from} -> {to}"));
        }
        to
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        match self.transition.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
