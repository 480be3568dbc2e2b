use anyhow::{bail, Result};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::analysis_loop::{analysis_loop, AnalysisContext};
use super::capture_loop::{capture_loop, CaptureContext};

/// Owns the capture and analysis tasks of one monitoring session and the
/// token that ends them.
#[derive(Default)]
pub struct SensingController {
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// Spawns both loops. The returned token is cancelled by `stop_sensing`;
    /// companion tasks should watch it and be handed over with `attach`.
    pub fn start_sensing(
        &mut self,
        capture: CaptureContext,
        analysis: AnalysisContext,
    ) -> Result<CancellationToken> {
        if self.cancel_token.is_some() {
            bail!("sensing already active");
        }

        info!(
            "starting sensing for monitors {:?}",
            capture.monitors.iter().map(|m| m.id).collect::<Vec<_>>()
        );

        let cancel_token = CancellationToken::new();
        self.handles
            .push(tokio::spawn(capture_loop(capture, cancel_token.clone())));
        self.handles
            .push(tokio::spawn(analysis_loop(analysis, cancel_token.clone())));
        self.cancel_token = Some(cancel_token.clone());
        Ok(cancel_token)
    }

    /// Joins `handle` on the next `stop_sensing`.
    pub fn attach(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub async fn stop_sensing(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let mut failed = 0;
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                warn!("sensing task failed to join: {err}");
                failed += 1;
            }
        }
        if failed > 0 {
            bail!("{failed} sensing task(s) failed to join");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::broadcast;
    use tokio::time::Duration;

    use crate::{
        action_log::ActionLog,
        detection::IssueDetector,
        display::fake::FakeDisplays,
        extraction::{fake::FixedText, ContentExtractor},
        metrics::MetricsCollector,
        sensing::LatestSnapshots,
    };

    fn contexts() -> (CaptureContext, AnalysisContext, Arc<LatestSnapshots>) {
        let source = Arc::new(FakeDisplays::new(&[1]));
        let store = Arc::new(LatestSnapshots::new());
        let metrics = MetricsCollector::new();
        let log = ActionLog::new();
        let capture = CaptureContext {
            monitors: source.displays.clone(),
            source,
            store: Arc::clone(&store),
            metrics: metrics.clone(),
            log: log.clone(),
            interval: Duration::from_millis(10),
        };
        let analysis = AnalysisContext {
            store: Arc::clone(&store),
            extractor: Arc::new(ContentExtractor::new(Arc::new(FixedText::new("ok")))),
            detector: Arc::new(IssueDetector::with_default_rules().unwrap()),
            metrics,
            log,
            issues: broadcast::channel(8).0,
            interval: Duration::from_millis(20),
            ocr_change_threshold: 8,
            ocr_cooldown: Duration::from_secs(5),
            issue_cooldown: Duration::from_secs(30),
        };
        (capture, analysis, store)
    }

    #[tokio::test]
    async fn start_then_stop() {
        let mut controller = SensingController::new();
        let (capture, analysis, store) = contexts();
        let token = controller.start_sensing(capture, analysis).unwrap();
        assert!(controller.is_active());

        let companion = token.clone();
        controller.attach(tokio::spawn(async move { companion.cancelled().await }));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.len(), 1);

        controller.stop_sensing().await.unwrap();
        assert!(!controller.is_active());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn refuses_a_second_start() {
        let mut controller = SensingController::new();
        let (capture, analysis, _) = contexts();
        controller.start_sensing(capture, analysis).unwrap();
        let (capture, analysis, _) = contexts();
        assert!(controller.start_sensing(capture, analysis).is_err());
        controller.stop_sensing().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_fine() {
        let mut controller = SensingController::new();
        assert!(controller.stop_sensing().await.is_ok());
    }
}
