use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use crate::{
    action_log::ActionLog,
    control::{ControlMachine, ControlState},
    models::{ActionPlan, AutomationStep, LogKind},
};

use super::{EmergencyStop, InputDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum Refusal {
    #[error("automation is not armed (state {0})")]
    NotArmed(ControlState),
    #[error("another plan is already executing")]
    AlreadyExecuting,
    #[error("emergency stop is in effect")]
    EmergencyStopActive,
    #[error("plan has no steps")]
    EmptyPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ExecutionOutcome {
    Completed {
        steps_executed: usize,
    },
    Refused {
        reason: Refusal,
    },
    /// `step_number` is 1-based.
    Failed {
        step_number: usize,
        steps_executed: usize,
        error: String,
    },
    /// `skipped_step` is the 1-based step that never ran (or was cut short).
    Stopped {
        skipped_step: usize,
        steps_executed: usize,
    },
}

impl ExecutionOutcome {
    pub fn steps_executed(&self) -> usize {
        match self {
            ExecutionOutcome::Completed { steps_executed }
            | ExecutionOutcome::Failed { steps_executed, .. }
            | ExecutionOutcome::Stopped { steps_executed, .. } => *steps_executed,
            ExecutionOutcome::Refused { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Pause between consecutive steps.
    pub step_pacing: Duration,
    /// Slice length for every sleep; bounds stop latency.
    pub stop_poll: Duration,
    /// Neutral pointer position used by the safe reset.
    pub safe_point: (i32, i32),
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_pacing: Duration::from_millis(150),
            stop_poll: Duration::from_millis(50),
            safe_point: (0, 0),
        }
    }
}

enum StepResult {
    Done,
    Interrupted,
}

/// Runs one plan at a time against the input device, checking the emergency
/// stop before every step and during every sleep slice.
///
/// `execute` blocks for the length of the plan; async callers go through
/// `spawn_blocking`.
#[derive(Clone)]
pub struct Executor {
    machine: Arc<ControlMachine>,
    input: Arc<Mutex<Box<dyn InputDevice>>>,
    log: ActionLog,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        machine: Arc<ControlMachine>,
        input: Box<dyn InputDevice>,
        log: ActionLog,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            machine,
            input: Arc::new(Mutex::new(input)),
            log,
            config,
        }
    }

    /// Blocks until no plan holds the input device.
    pub fn wait_idle(&self) {
        drop(self.lock_input());
    }

    pub fn execute(&self, plan: ActionPlan) -> ExecutionOutcome {
        let short_id = &plan.id[..plan.id.len().min(8)];
        let origin = plan.origin.summary();

        if plan.is_empty() {
            return self.refuse(short_id, &origin, Refusal::EmptyPlan);
        }
        if let Err(reason) = self.machine.begin_execution() {
            return self.refuse(short_id, &origin, reason);
        }

        let total = plan.len();
        self.log.append(
            LogKind::Info,
            format!(
                "Executing plan {short_id} ({}) for {origin}: {total} steps",
                plan.intent.as_str()
            ),
        );

        let stop = self.machine.emergency_stop_handle();
        let mut input = self.lock_input();
        let mut executed = 0;

        for (index, step) in plan.steps.iter().enumerate() {
            let number = index + 1;

            if stop.is_triggered() {
                return self.abort_for_stop(&mut input, short_id, number, total, executed);
            }
            let paced = index == 0
                || sleep_unless_stopped(self.config.step_pacing, self.config.stop_poll, &stop);
            if !paced {
                return self.abort_for_stop(&mut input, short_id, number, total, executed);
            }

            match self.run_step(&mut **input, step, &stop) {
                Ok(StepResult::Done) => {
                    executed += 1;
                    self.log.append(
                        LogKind::Step,
                        format!("Step {number}/{total}: {}", step.describe()),
                    );
                }
                Ok(StepResult::Interrupted) => {
                    return self.abort_for_stop(&mut input, short_id, number, total, executed);
                }
                Err(err) => {
                    self.log.append(
                        LogKind::Failure,
                        format!(
                            "Step {number}/{total} ({}) failed: {err:#}; aborted plan {short_id} with {} steps not run",
                            step.describe(),
                            total - number
                        ),
                    );
                    if let Err(release_err) = input.release_all() {
                        log::warn!("failed to release keys after step failure: {release_err:#}");
                    }
                    if self.machine.finish_execution() == ControlState::EmergencyStopped {
                        self.safe_reset(&mut input);
                    }
                    return ExecutionOutcome::Failed {
                        step_number: number,
                        steps_executed: executed,
                        error: format!("{err:#}"),
                    };
                }
            }
        }

        // The last step may have been in flight when the stop arrived.
        if self.machine.finish_execution() == ControlState::EmergencyStopped {
            self.safe_reset(&mut input);
            self.log.append(
                LogKind::SafetyStop,
                format!(
                    "Emergency stop observed after plan {short_id} finished its last step; input reset"
                ),
            );
        }
        self.log.append(
            LogKind::Info,
            format!("Plan {short_id} completed: {executed}/{total} steps"),
        );
        ExecutionOutcome::Completed {
            steps_executed: executed,
        }
    }

    fn run_step(
        &self,
        input: &mut dyn InputDevice,
        step: &AutomationStep,
        stop: &EmergencyStop,
    ) -> Result<StepResult> {
        match step {
            AutomationStep::Wait { duration } => {
                if sleep_unless_stopped(*duration, self.config.stop_poll, stop) {
                    Ok(StepResult::Done)
                } else {
                    Ok(StepResult::Interrupted)
                }
            }
            AutomationStep::KeyPress { key } => input.press_key(*key).map(|_| StepResult::Done),
            AutomationStep::Hotkey { keys } => input.hotkey(keys).map(|_| StepResult::Done),
            AutomationStep::TypeText { text } => input.type_text(text).map(|_| StepResult::Done),
        }
    }

    fn abort_for_stop(
        &self,
        input: &mut Box<dyn InputDevice>,
        short_id: &str,
        skipped_step: usize,
        total: usize,
        executed: usize,
    ) -> ExecutionOutcome {
        self.safe_reset(input);
        self.machine.enter_emergency_stopped();
        self.log.append(
            LogKind::SafetyStop,
            format!(
                "Emergency stop: aborted plan {short_id} at step {skipped_step}/{total} ({executed} steps executed); input reset to safe state"
            ),
        );
        ExecutionOutcome::Stopped {
            skipped_step,
            steps_executed: executed,
        }
    }

    /// Releases held keys and parks the pointer. Failures are logged; the
    /// state transition happens regardless.
    fn safe_reset(&self, input: &mut Box<dyn InputDevice>) {
        if let Err(err) = input.release_all() {
            self.log.append(
                LogKind::Failure,
                format!("Safe reset could not release keys: {err:#}"),
            );
        }
        let (x, y) = self.config.safe_point;
        if let Err(err) = input.move_pointer(x, y) {
            self.log.append(
                LogKind::Failure,
                format!("Safe reset could not move pointer to ({x}, {y}): {err:#}"),
            );
        }
    }

    fn refuse(&self, short_id: &str, origin: &str, reason: Refusal) -> ExecutionOutcome {
        self.log.append(
            LogKind::Refusal,
            format!("Refused plan {short_id} for {origin}: {reason}"),
        );
        ExecutionOutcome::Refused { reason }
    }

    fn lock_input(&self) -> MutexGuard<'_, Box<dyn InputDevice>> {
        match self.input.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Sleeps in `poll`-sized slices. Returns false as soon as the stop is seen.
fn sleep_unless_stopped(duration: Duration, poll: Duration, stop: &EmergencyStop) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.is_triggered() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(poll.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        automation::{InputAction, RecordingInput},
        models::{Intent, Key, PlanOrigin},
    };

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            step_pacing: Duration::ZERO,
            stop_poll: Duration::from_millis(5),
            safe_point: (0, 0),
        }
    }

    fn armed_machine(log: &ActionLog) -> Arc<ControlMachine> {
        let machine = Arc::new(ControlMachine::new(log.clone()));
        machine.start_monitoring().unwrap();
        machine.arm_automation().unwrap();
        machine
    }

    fn five_step_plan() -> ActionPlan {
        ActionPlan::new(
            PlanOrigin::UserRequest("fix the error".into()),
            Intent::FixError,
            vec![
                AutomationStep::hotkey(&[Key::Control, Key::Char('f')]),
                AutomationStep::type_text("error"),
                AutomationStep::key(Key::Enter),
                AutomationStep::key(Key::Escape),
                AutomationStep::key(Key::F(8)),
            ],
        )
    }

    #[test]
    fn completes_plan_and_rests_in_monitoring() {
        let log = ActionLog::new();
        let machine = armed_machine(&log);
        let input = RecordingInput::new();
        let executor = Executor::new(
            machine.clone(),
            Box::new(input.clone()),
            log.clone(),
            fast_config(),
        );

        let outcome = executor.execute(five_step_plan());

        assert_eq!(outcome, ExecutionOutcome::Completed { steps_executed: 5 });
        assert_eq!(input.step_actions().len(), 5);
        assert_eq!(machine.state(), ControlState::Monitoring);
        assert!(log
            .entries()
            .iter()
            .any(|e| e.message.contains("completed: 5/5")));
    }

    #[test]
    fn refuses_when_not_armed_and_leaves_state_alone() {
        let log = ActionLog::new();
        let machine = Arc::new(ControlMachine::new(log.clone()));
        machine.start_monitoring().unwrap();
        let input = RecordingInput::new();
        let executor = Executor::new(
            machine.clone(),
            Box::new(input.clone()),
            log.clone(),
            fast_config(),
        );

        let outcome = executor.execute(five_step_plan());

        assert_eq!(
            outcome,
            ExecutionOutcome::Refused {
                reason: Refusal::NotArmed(ControlState::Monitoring)
            }
        );
        assert!(input.actions().is_empty());
        assert_eq!(machine.state(), ControlState::Monitoring);
        assert!(log.entries().iter().any(|e| e.kind == LogKind::Refusal));
    }

    #[test]
    fn refuses_while_stop_is_set() {
        let log = ActionLog::new();
        let machine = armed_machine(&log);
        machine.emergency_stop();
        let input = RecordingInput::new();
        let executor = Executor::new(machine.clone(), Box::new(input.clone()), log, fast_config());

        let outcome = executor.execute(five_step_plan());

        assert_eq!(
            outcome,
            ExecutionOutcome::Refused {
                reason: Refusal::EmergencyStopActive
            }
        );
        assert!(input.actions().is_empty());
    }

    #[test]
    fn stop_after_step_two_skips_step_three_onward() {
        let log = ActionLog::new();
        let machine = armed_machine(&log);
        let input =
            RecordingInput::new().tripping_stop_after(2, machine.emergency_stop_handle());
        let executor = Executor::new(
            machine.clone(),
            Box::new(input.clone()),
            log.clone(),
            fast_config(),
        );

        let outcome = executor.execute(five_step_plan());

        assert_eq!(
            outcome,
            ExecutionOutcome::Stopped {
                skipped_step: 3,
                steps_executed: 2
            }
        );
        assert_eq!(input.step_actions().len(), 2);
        assert_eq!(machine.state(), ControlState::EmergencyStopped);

        let actions = input.actions();
        assert_eq!(actions[actions.len() - 2], InputAction::ReleaseAll);
        assert_eq!(actions[actions.len() - 1], InputAction::MovePointer { x: 0, y: 0 });

        let abort = log
            .entries()
            .into_iter()
            .find(|e| e.kind == LogKind::SafetyStop)
            .expect("abort entry");
        assert!(abort.message.contains("step 3/5"));
    }

    #[test]
    fn step_failure_aborts_and_returns_to_resting_state() {
        let log = ActionLog::new();
        let machine = armed_machine(&log);
        let input = RecordingInput::new().failing_on_step(3);
        let executor = Executor::new(
            machine.clone(),
            Box::new(input.clone()),
            log.clone(),
            fast_config(),
        );

        let outcome = executor.execute(five_step_plan());

        match outcome {
            ExecutionOutcome::Failed {
                step_number,
                steps_executed,
                ..
            } => {
                assert_eq!(step_number, 3);
                assert_eq!(steps_executed, 2);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(input.step_actions().len(), 2);
        assert_eq!(machine.state(), ControlState::Monitoring);
        let failure = log
            .entries()
            .into_iter()
            .find(|e| e.kind == LogKind::Failure)
            .expect("failure entry");
        assert!(failure.message.contains("Step 3/5"));
    }

    #[test]
    fn long_wait_is_interrupted_within_a_poll_interval() {
        let log = ActionLog::new();
        let machine = armed_machine(&log);
        let input = RecordingInput::new();
        let executor = Executor::new(
            machine.clone(),
            Box::new(input.clone()),
            log,
            ExecutorConfig {
                stop_poll: Duration::from_millis(20),
                ..fast_config()
            },
        );
        let plan = ActionPlan::new(
            PlanOrigin::UserRequest("wait".into()),
            Intent::General,
            vec![
                AutomationStep::wait_ms(10_000),
                AutomationStep::key(Key::Escape),
            ],
        );

        let stopper = machine.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let stopped_at = Instant::now();
            stopper.emergency_stop();
            stopped_at
        });

        let outcome = executor.execute(plan);
        let returned_at = Instant::now();
        let stopped_at = handle.join().unwrap();

        // One 20ms poll slice plus scheduling slack.
        let latency = returned_at.duration_since(stopped_at);
        assert!(latency < Duration::from_millis(150), "stop took {latency:?}");
        assert_eq!(
            outcome,
            ExecutionOutcome::Stopped {
                skipped_step: 1,
                steps_executed: 0
            }
        );
        assert!(input.step_actions().is_empty());
        assert_eq!(machine.state(), ControlState::EmergencyStopped);
    }

    #[test]
    fn stop_during_last_step_still_resets_input() {
        let log = ActionLog::new();
        let machine = armed_machine(&log);
        let input =
            RecordingInput::new().tripping_stop_after(5, machine.emergency_stop_handle());
        let executor = Executor::new(machine.clone(), Box::new(input.clone()), log, fast_config());

        let outcome = executor.execute(five_step_plan());

        assert_eq!(outcome, ExecutionOutcome::Completed { steps_executed: 5 });
        assert_eq!(machine.state(), ControlState::EmergencyStopped);
        assert_eq!(input.actions().last(), Some(&InputAction::MovePointer { x: 0, y: 0 }));
    }

    #[test]
    fn empty_plan_is_refused_without_touching_state() {
        let log = ActionLog::new();
        let machine = armed_machine(&log);
        let executor = Executor::new(
            machine.clone(),
            Box::new(RecordingInput::new()),
            log,
            fast_config(),
        );
        let plan = ActionPlan::new(PlanOrigin::UserRequest("x".into()), Intent::General, vec![]);

        assert_eq!(
            executor.execute(plan),
            ExecutionOutcome::Refused {
                reason: Refusal::EmptyPlan
            }
        );
        assert_eq!(machine.state(), ControlState::AutomationArmed);
    }

    #[test]
    fn pacing_sleep_honours_stop() {
        let stop = EmergencyStop::new();
        assert!(sleep_unless_stopped(
            Duration::from_millis(5),
            Duration::from_millis(1),
            &stop
        ));
        stop.trigger();
        assert!(!sleep_unless_stopped(
            Duration::from_secs(5),
            Duration::from_millis(1),
            &stop
        ));
    }
}
