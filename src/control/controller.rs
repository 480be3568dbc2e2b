use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    action_log::ActionLog,
    automation::{ExecutionOutcome, Executor, ExecutorConfig, InputDevice},
    detection::IssueDetector,
    display::{primary_display, select_monitors, DisplayInfo, DisplaySource},
    extraction::{ContentExtractor, TextRecognizer},
    metrics::{MetricsCollector, MetricsSnapshot},
    models::{
        ActionLogEntry, ActionPlan, AutomationStep, DetectedIssue, Intent, Key, LogKind,
        PlanOrigin,
    },
    planning::{PlanGenerator, ResponseProvider},
    sensing::{AnalysisContext, CaptureContext, LatestSnapshots, SensingController},
    settings::AgentSettings,
};

use super::state::{ControlMachine, ControlState, TransitionError};

const ISSUE_CHANNEL_CAPACITY: usize = 64;
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Platform backends the agent drives. Tests hand in fakes.
pub struct AgentDeps {
    pub source: Arc<dyn DisplaySource>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub input: Box<dyn InputDevice>,
    pub provider: Option<Arc<dyn ResponseProvider>>,
}

/// Runs plans and turns issues into plans. Shared by the request path and the
/// remediation task.
#[derive(Clone)]
struct Dispatcher {
    machine: Arc<ControlMachine>,
    executor: Executor,
    planner: PlanGenerator,
    log: ActionLog,
    metrics: MetricsCollector,
    auto_remediate: bool,
}

impl Dispatcher {
    async fn run(&self, plan: ActionPlan) -> ExecutionOutcome {
        let executor = self.executor.clone();
        let outcome = match tokio::task::spawn_blocking(move || executor.execute(plan)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.log
                    .append(LogKind::Failure, format!("Executor worker crashed: {err}"));
                if self.machine.state() == ControlState::Executing {
                    self.machine.finish_execution();
                }
                ExecutionOutcome::Failed {
                    step_number: 0,
                    steps_executed: 0,
                    error: err.to_string(),
                }
            }
        };
        self.metrics.record_outcome(&outcome).await;
        outcome
    }

    /// Returns once the executor has let go of the input device.
    async fn wait_for_executor(&self) {
        let executor = self.executor.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || executor.wait_idle()).await {
            log::warn!("executor wait failed to join: {err}");
        }
    }

    async fn remediate(&self, issue: DetectedIssue) {
        if !self.auto_remediate || self.machine.state() != ControlState::AutomationArmed {
            return;
        }
        match self.planner.plan_for_issue(&issue) {
            Ok(plan) => {
                self.log.append(
                    LogKind::Info,
                    format!(
                        "Auto-remediation for '{}' on monitor {}: {} steps",
                        issue.keyword,
                        issue.monitor_id,
                        plan.len()
                    ),
                );
                self.run(plan).await;
            }
            Err(err) => {
                self.log.append(
                    LogKind::Failure,
                    format!("No remediation for '{}': {err}", issue.keyword),
                );
            }
        }
    }
}

async fn remediation_loop(
    dispatcher: Dispatcher,
    mut issues: broadcast::Receiver<DetectedIssue>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            received = issues.recv() => match received {
                Ok(issue) => dispatcher.remediate(issue).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("remediation fell behind; {missed} issues dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = cancel_token.cancelled() => break,
        }
    }
}

/// Front door of the agent: monitoring, consent, requests and the emergency
/// stop. Cheap to clone; every clone drives the same agent.
#[derive(Clone)]
pub struct AgentController {
    settings: AgentSettings,
    machine: Arc<ControlMachine>,
    log: ActionLog,
    source: Arc<dyn DisplaySource>,
    extractor: Arc<ContentExtractor>,
    detector: Arc<IssueDetector>,
    dispatcher: Dispatcher,
    store: Arc<LatestSnapshots>,
    metrics: MetricsCollector,
    issues: broadcast::Sender<DetectedIssue>,
    sensing: Arc<Mutex<SensingController>>,
}

impl AgentController {
    pub fn new(deps: AgentDeps, settings: AgentSettings) -> Result<Self> {
        let log = ActionLog::new();
        let machine = Arc::new(ControlMachine::new(log.clone()));
        let metrics = MetricsCollector::new();

        let safe_point = match deps.source.list_displays() {
            Ok(displays) => primary_display(&displays)
                .map(|d| settings.safe_corner.point(d.x, d.y, d.width, d.height))
                .unwrap_or((0, 0)),
            Err(err) => {
                log::warn!("could not list displays for the safe corner, using 0,0: {err:#}");
                (0, 0)
            }
        };

        let executor = Executor::new(
            Arc::clone(&machine),
            deps.input,
            log.clone(),
            ExecutorConfig {
                step_pacing: settings.step_pacing(),
                stop_poll: settings.stop_poll_interval(),
                safe_point,
            },
        );
        let planner = match deps.provider {
            Some(provider) => PlanGenerator::with_provider(provider),
            None => PlanGenerator::new(),
        };
        let dispatcher = Dispatcher {
            machine: Arc::clone(&machine),
            executor,
            planner,
            log: log.clone(),
            metrics: metrics.clone(),
            auto_remediate: settings.auto_remediate,
        };
        let (issues, _) = broadcast::channel(ISSUE_CHANNEL_CAPACITY);

        Ok(Self {
            machine,
            log,
            source: deps.source,
            extractor: Arc::new(ContentExtractor::new(deps.recognizer)),
            detector: Arc::new(
                IssueDetector::with_default_rules().context("failed to build issue detector")?,
            ),
            dispatcher,
            store: Arc::new(LatestSnapshots::new()),
            metrics,
            issues,
            sensing: Arc::new(Mutex::new(SensingController::new())),
            settings,
        })
    }

    pub fn state(&self) -> ControlState {
        self.machine.state()
    }

    pub fn is_monitoring(&self) -> bool {
        self.machine.is_monitoring()
    }

    pub fn subscribe_log(&self) -> broadcast::Receiver<ActionLogEntry> {
        self.log.subscribe()
    }

    pub fn subscribe_issues(&self) -> broadcast::Receiver<DetectedIssue> {
        self.issues.subscribe()
    }

    pub fn log_entries(&self) -> Vec<ActionLogEntry> {
        self.log.entries()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.metrics.get_snapshot().await
    }

    pub async fn list_displays(&self) -> Result<Vec<DisplayInfo>> {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.list_displays())
            .await
            .context("display enumeration worker join failed")?
    }

    /// Starts watching `monitor_ids` (empty: the configured default, or all).
    /// Returns the ids actually watched.
    pub async fn start_monitoring(&self, monitor_ids: &[u32]) -> Result<Vec<u32>> {
        let mut sensing = self.sensing.lock().await;
        if sensing.is_active() {
            return Err(self.refused("Start monitoring", TransitionError::AlreadyMonitoring));
        }

        let requested = if monitor_ids.is_empty() {
            self.settings.default_monitors.clone()
        } else {
            monitor_ids.to_vec()
        };
        let displays = match self.list_displays().await {
            Ok(displays) => displays,
            Err(err) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Could not enumerate monitors: {err:#}"),
                );
                return Err(err);
            }
        };
        let selected = select_monitors(&displays, &requested);
        if selected.is_empty() {
            self.log.append(
                LogKind::Failure,
                format!("No connected monitor matches {requested:?}"),
            );
            bail!("no connected monitor matches {requested:?}");
        }

        self.machine
            .start_monitoring()
            .map_err(|err| self.refused("Start monitoring", err))?;

        let ids: Vec<u32> = selected.iter().map(|d| d.id).collect();
        let capture = CaptureContext {
            source: Arc::clone(&self.source),
            monitors: selected,
            store: Arc::clone(&self.store),
            metrics: self.metrics.clone(),
            log: self.log.clone(),
            interval: self.settings.capture_interval(),
        };
        let analysis = AnalysisContext {
            store: Arc::clone(&self.store),
            extractor: Arc::clone(&self.extractor),
            detector: Arc::clone(&self.detector),
            metrics: self.metrics.clone(),
            log: self.log.clone(),
            issues: self.issues.clone(),
            interval: self.settings.analysis_interval(),
            ocr_change_threshold: self.settings.ocr_change_threshold,
            ocr_cooldown: self.settings.ocr_cooldown(),
            issue_cooldown: self.settings.issue_cooldown(),
        };

        // Subscribe before the loops exist so no early issue is missed.
        let issues = self.issues.subscribe();
        let token = match sensing.start_sensing(capture, analysis) {
            Ok(token) => token,
            Err(err) => {
                let _ = self.machine.stop_monitoring();
                self.log
                    .append(LogKind::Failure, format!("Sensing failed to start: {err:#}"));
                return Err(err);
            }
        };
        sensing.attach(tokio::spawn(remediation_loop(
            self.dispatcher.clone(),
            issues,
            token,
        )));

        self.log
            .append(LogKind::Info, format!("Monitoring monitors {ids:?}"));
        Ok(ids)
    }

    pub async fn stop_monitoring(&self) -> Result<ControlState> {
        let mut sensing = self.sensing.lock().await;
        let state = self
            .machine
            .stop_monitoring()
            .map_err(|err| self.refused("Stop monitoring", err))?;

        let stopped = sensing.stop_sensing().await;
        self.store.clear();
        stopped?;
        self.log.append(LogKind::Info, "Monitoring stopped");
        Ok(state)
    }

    pub fn arm_automation(&self) -> Result<ControlState> {
        self.machine
            .arm_automation()
            .map_err(|err| self.refused("Arm automation", err))
    }

    pub fn disarm_automation(&self) -> Result<ControlState> {
        self.machine
            .disarm_automation()
            .map_err(|err| self.refused("Disarm automation", err))
    }

    /// Never blocks and never fails; safe to call from any thread.
    pub fn emergency_stop(&self) -> ControlState {
        self.machine.emergency_stop()
    }

    /// Plans `text` and runs the plan if automation is armed. A refusal comes
    /// back as an outcome; only an unplannable request is an error.
    pub async fn submit_request(&self, text: &str) -> Result<ExecutionOutcome> {
        let plan = match self.dispatcher.planner.plan_for_request(text).await {
            Ok(plan) => plan,
            Err(err) => {
                self.log
                    .append(LogKind::Refusal, format!("Request not planned: {err}"));
                return Err(err.into());
            }
        };
        self.log.append(
            LogKind::Info,
            format!(
                "Planned {} for {}: {} steps",
                plan.intent.as_str(),
                plan.origin.summary(),
                plan.len()
            ),
        );
        Ok(self.dispatcher.run(plan).await)
    }

    /// Runs a single key or combo as a one-step plan, under the same consent
    /// rules as any other plan.
    pub async fn press_keys(&self, keys: &[Key]) -> ExecutionOutcome {
        let steps = match keys {
            [] => vec![],
            [key] => vec![AutomationStep::key(*key)],
            combo => vec![AutomationStep::hotkey(combo)],
        };
        let combo: Vec<String> = keys.iter().map(Key::to_string).collect();
        let plan = ActionPlan::new(
            PlanOrigin::UserRequest(format!("key {}", combo.join("+"))),
            Intent::General,
            steps,
        );
        self.dispatcher.run(plan).await
    }

    /// Closes the agent: halts any plan, ends monitoring, clears consent and
    /// the stop flag. A running plan is stopped and awaited; the flag is only
    /// cleared once it has returned.
    pub async fn shutdown(&self) -> Result<()> {
        if self.machine.disarm_automation() == Err(TransitionError::ExecutionInProgress) {
            self.machine.emergency_stop();
        }

        let stopped = self.sensing.lock().await.stop_sensing().await;
        self.store.clear();
        while !self.machine.reset() {
            self.dispatcher.wait_for_executor().await;
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
        self.log.append(LogKind::Info, "Agent shut down");
        stopped
    }

    fn refused(&self, action: &str, err: TransitionError) -> anyhow::Error {
        self.log
            .append(LogKind::Refusal, format!("{action} refused: {err}"));
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        automation::{InputAction, RecordingInput, Refusal},
        display::fake::FakeDisplays,
        extraction::fake::FixedText,
        planning::PlanError,
    };

    struct Rig {
        controller: AgentController,
        input: RecordingInput,
    }

    /// Records like `RecordingInput` but each `type_text` keeps the device
    /// busy for `delay` after recording, the way slow key-by-key typing does.
    struct SlowTyping {
        inner: RecordingInput,
        delay: Duration,
    }

    impl InputDevice for SlowTyping {
        fn press_key(&mut self, key: Key) -> Result<()> {
            self.inner.press_key(key)
        }

        fn hotkey(&mut self, keys: &[Key]) -> Result<()> {
            self.inner.hotkey(keys)
        }

        fn type_text(&mut self, text: &str) -> Result<()> {
            self.inner.type_text(text)?;
            std::thread::sleep(self.delay);
            Ok(())
        }

        fn move_pointer(&mut self, x: i32, y: i32) -> Result<()> {
            self.inner.move_pointer(x, y)
        }

        fn release_all(&mut self) -> Result<()> {
            self.inner.release_all()
        }
    }

    fn controller_with(screen_text: &str, input: Box<dyn InputDevice>) -> AgentController {
        let deps = AgentDeps {
            source: Arc::new(FakeDisplays::new(&[1, 2])),
            recognizer: Arc::new(FixedText::new(screen_text)),
            input,
            provider: None,
        };
        let settings = AgentSettings {
            capture_interval_ms: 10,
            analysis_interval_ms: 20,
            stop_poll_interval_ms: 10,
            step_pacing_ms: 0,
            ..AgentSettings::default()
        };
        AgentController::new(deps, settings).unwrap()
    }

    fn rig(screen_text: &str) -> Rig {
        let input = RecordingInput::new();
        Rig {
            controller: controller_with(screen_text, Box::new(input.clone())),
            input,
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..150 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    fn count(controller: &AgentController, kind: LogKind) -> usize {
        controller
            .log_entries()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    #[tokio::test]
    async fn unarmed_request_is_refused_and_state_kept() {
        let Rig { controller, input } = rig("all good");
        controller.start_monitoring(&[]).await.unwrap();

        let outcome = controller.submit_request("debug this code").await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Refused {
                reason: Refusal::NotArmed(ControlState::Monitoring)
            }
        );
        assert_eq!(controller.state(), ControlState::Monitoring);
        assert_eq!(count(&controller, LogKind::Refusal), 1);
        assert!(input.actions().is_empty());
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn armed_request_runs_and_consumes_consent() {
        let Rig { controller, input } = rig("all good");
        controller.start_monitoring(&[1]).await.unwrap();
        controller.arm_automation().unwrap();

        let outcome = controller.submit_request("debug this code").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed { steps_executed: 4 });
        assert_eq!(controller.state(), ControlState::Monitoring);
        assert_eq!(
            input.step_actions(),
            vec![
                InputAction::PressKey { key: Key::F(9) },
                InputAction::PressKey { key: Key::F(5) },
            ]
        );
        assert_eq!(controller.metrics().await.counters.plans_completed, 1);
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn armed_agent_remediates_a_detected_issue() {
        let Rig { controller, input } = rig("Unhandled exception in worker");
        let mut issues = controller.subscribe_issues();
        controller.start_monitoring(&[1]).await.unwrap();
        controller.arm_automation().unwrap();

        let issue = tokio::time::timeout(Duration::from_secs(3), issues.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(issue.keyword, "exception");

        let view = input.clone();
        assert!(wait_for(|| view.step_actions().len() == 5).await);
        assert!(wait_for(|| controller.state() == ControlState::Monitoring).await);
        assert!(input.step_actions().contains(&InputAction::TypeText {
            text: "exception".into()
        }));
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unarmed_agent_only_reports() {
        let Rig { controller, input } = rig("fatal: disk full");
        controller.start_monitoring(&[]).await.unwrap();

        assert!(wait_for(|| count(&controller, LogKind::Detection) >= 2).await);
        assert!(input.actions().is_empty());
        assert_eq!(controller.state(), ControlState::Monitoring);
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn consent_does_not_survive_a_restart() {
        let Rig { controller, .. } = rig("all good");
        controller.start_monitoring(&[]).await.unwrap();
        controller.arm_automation().unwrap();
        controller.stop_monitoring().await.unwrap();
        assert_eq!(controller.state(), ControlState::Idle);

        controller.start_monitoring(&[]).await.unwrap();
        assert_eq!(controller.state(), ControlState::Monitoring);
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn emergency_stop_interrupts_a_running_plan() {
        let Rig { controller, input } = rig("all good");
        controller.start_monitoring(&[1]).await.unwrap();
        controller.arm_automation().unwrap();

        let running = controller.clone();
        let handle =
            tokio::spawn(async move { running.submit_request("debug this code").await });
        assert!(wait_for(|| input.step_actions().len() == 2).await);
        controller.emergency_stop();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Stopped {
                skipped_step: 4,
                steps_executed: 3
            }
        );
        assert_eq!(controller.state(), ControlState::EmergencyStopped);
        let actions = input.actions();
        assert!(actions.contains(&InputAction::ReleaseAll));
        assert_eq!(actions.last(), Some(&InputAction::MovePointer { x: 0, y: 0 }));
        assert!(count(&controller, LogKind::SafetyStop) >= 1);

        controller.arm_automation().unwrap();
        assert_eq!(controller.state(), ControlState::AutomationArmed);
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn key_combo_needs_consent() {
        let Rig { controller, input } = rig("all good");
        controller.start_monitoring(&[1]).await.unwrap();

        let combo = [Key::Control, Key::Char('s')];
        assert!(matches!(
            controller.press_keys(&combo).await,
            ExecutionOutcome::Refused { .. }
        ));
        assert!(input.actions().is_empty());

        controller.arm_automation().unwrap();
        assert_eq!(
            controller.press_keys(&combo).await,
            ExecutionOutcome::Completed { steps_executed: 1 }
        );
        assert_eq!(
            input.step_actions(),
            vec![InputAction::Hotkey {
                keys: combo.to_vec()
            }]
        );
        assert_eq!(controller.state(), ControlState::Monitoring);
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_monitors_leave_the_agent_idle() {
        let Rig { controller, .. } = rig("all good");
        assert!(controller.start_monitoring(&[42]).await.is_err());
        assert_eq!(controller.state(), ControlState::Idle);
        assert_eq!(count(&controller, LogKind::Failure), 1);
    }

    #[tokio::test]
    async fn double_start_and_idle_stop_are_refused() {
        let Rig { controller, .. } = rig("all good");
        let err = controller.stop_monitoring().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TransitionError>(),
            Some(&TransitionError::NotMonitoring)
        );

        controller.start_monitoring(&[]).await.unwrap();
        let err = controller.start_monitoring(&[]).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TransitionError>(),
            Some(&TransitionError::AlreadyMonitoring)
        );
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn blank_request_is_reported() {
        let Rig { controller, .. } = rig("all good");
        let err = controller.submit_request("   ").await.unwrap_err();
        assert_eq!(err.downcast_ref::<PlanError>(), Some(&PlanError::EmptyRequest));
        assert_eq!(controller.state(), ControlState::Idle);
        assert_eq!(count(&controller, LogKind::Refusal), 1);
    }

    #[tokio::test]
    async fn shutdown_waits_for_a_slow_step_and_runs_nothing_after_it() {
        let input = RecordingInput::new();
        let controller = controller_with(
            "all good",
            Box::new(SlowTyping {
                inner: input.clone(),
                delay: Duration::from_millis(400),
            }),
        );
        controller.start_monitoring(&[1]).await.unwrap();
        controller.arm_automation().unwrap();

        let running = controller.clone();
        let handle = tokio::spawn(async move { running.submit_request("write a parser").await });
        let view = input.clone();
        assert!(
            wait_for(|| view
                .step_actions()
                .iter()
                .any(|a| matches!(a, InputAction::TypeText { .. })))
            .await
        );

        controller.shutdown().await.unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Stopped {
                skipped_step: 4,
                steps_executed: 3
            }
        );
        assert!(!input
            .step_actions()
            .contains(&InputAction::PressKey { key: Key::Enter }));
        assert_eq!(input.actions().last(), Some(&InputAction::MovePointer { x: 0, y: 0 }));
        assert_eq!(controller.state(), ControlState::Idle);
        assert!(!controller.machine.is_stop_triggered());
    }

    #[tokio::test]
    async fn shutdown_clears_everything() {
        let Rig { controller, .. } = rig("all good");
        controller.start_monitoring(&[]).await.unwrap();
        controller.emergency_stop();
        controller.shutdown().await.unwrap();

        assert_eq!(controller.state(), ControlState::Idle);
        assert!(!controller.is_monitoring());
        assert!(controller.arm_automation().is_err());
    }
}
