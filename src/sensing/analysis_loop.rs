use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    action_log::ActionLog,
    detection::IssueDetector,
    extraction::ContentExtractor,
    metrics::{AnalysisMetrics, MetricsCollector},
    models::{DetectedIssue, HintKind, LogKind, MonitorSnapshot},
};

use super::phash::{compute_hamming_distance, compute_phash};
use super::snapshot_store::LatestSnapshots;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub struct AnalysisContext {
    pub store: Arc<LatestSnapshots>,
    pub extractor: Arc<ContentExtractor>,
    pub detector: Arc<IssueDetector>,
    pub metrics: MetricsCollector,
    pub log: ActionLog,
    pub issues: broadcast::Sender<DetectedIssue>,
    pub interval: Duration,
    /// Minimum perceptual-hash distance that counts as a changed screen.
    pub ocr_change_threshold: u32,
    /// An unchanged screen is still re-read once this much time has passed.
    pub ocr_cooldown: Duration,
    /// The same keyword on the same monitor is reported at most this often.
    pub issue_cooldown: Duration,
}

#[derive(Default)]
struct MonitorTracker {
    last_sequence: Option<u64>,
    last_ocr_phash: Option<String>,
    last_ocr_time: Option<Instant>,
    ocr_failing: bool,
}

pub async fn analysis_loop(ctx: AnalysisContext, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut analyzer = Analyzer::new(ctx);

    log_info!("analysis loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    _ = analyzer.tick() => {}
                    _ = cancel_token.cancelled() => break,
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("analysis loop shutting down");
}

pub(crate) struct Analyzer {
    ctx: AnalysisContext,
    trackers: HashMap<u32, MonitorTracker>,
    reported: HashMap<(u32, String), Instant>,
}

impl Analyzer {
    pub(crate) fn new(ctx: AnalysisContext) -> Self {
        Self {
            ctx,
            trackers: HashMap::new(),
            reported: HashMap::new(),
        }
    }

    /// Analyzes the newest frame of each monitor once. Frames that arrived and
    /// were replaced between ticks are never seen.
    pub(crate) async fn tick(&mut self) {
        let cooldown = self.ctx.issue_cooldown;
        self.reported
            .retain(|_, reported_at| reported_at.elapsed() < cooldown);

        for snapshot in self.ctx.store.latest_all() {
            let monitor_id = snapshot.monitor_id;
            if let Err(err) = self.analyze(snapshot).await {
                log_error!("analysis of monitor {} failed: {err:?}", monitor_id);
            }
        }
    }

    async fn analyze(&mut self, snapshot: Arc<MonitorSnapshot>) -> Result<()> {
        let started = Instant::now();
        let monitor_id = snapshot.monitor_id;
        let tracker = self.trackers.entry(monitor_id).or_default();
        if tracker.last_sequence == Some(snapshot.sequence) {
            return Ok(());
        }
        tracker.last_sequence = Some(snapshot.sequence);

        let phash_start = Instant::now();
        let phash = tokio::task::spawn_blocking({
            let snapshot = Arc::clone(&snapshot);
            move || compute_phash(&snapshot.image)
        })
        .await
        .context("phash worker join failed")?;
        let phash_ms = phash_start.elapsed().as_millis() as u64;

        if let Some(reason) = ocr_skip_reason(
            &phash,
            tracker.last_ocr_phash.as_deref(),
            tracker.last_ocr_time.as_ref(),
            self.ctx.ocr_change_threshold,
            self.ctx.ocr_cooldown,
        ) {
            log_debug!("monitor {} OCR skipped: {}", monitor_id, reason);
            self.ctx
                .metrics
                .record_analysis(AnalysisMetrics {
                    timestamp: Utc::now(),
                    monitor_id,
                    phash_ms,
                    ocr_ms: None,
                    ocr_skipped_reason: Some(reason.to_string()),
                    issues: 0,
                    total_ms: started.elapsed().as_millis() as u64,
                })
                .await;
            return Ok(());
        }

        let ocr_start = Instant::now();
        let extracted = tokio::task::spawn_blocking({
            let extractor = Arc::clone(&self.ctx.extractor);
            let snapshot = Arc::clone(&snapshot);
            move || extractor.extract(&snapshot)
        })
        .await
        .context("extraction worker join failed")?;
        let ocr_ms = ocr_start.elapsed().as_millis() as u64;

        let content = match extracted {
            Ok(content) => content,
            Err(err) => {
                // The gate is left as it was so the next frame retries OCR.
                if !std::mem::replace(&mut tracker.ocr_failing, true) {
                    self.ctx.log.append(
                        LogKind::Failure,
                        format!("OCR on monitor {monitor_id} failed: {err:#}"),
                    );
                } else {
                    log_warn!("OCR on monitor {} failed again: {:#}", monitor_id, err);
                }
                self.ctx
                    .metrics
                    .record_analysis(AnalysisMetrics {
                        timestamp: Utc::now(),
                        monitor_id,
                        phash_ms,
                        ocr_ms: Some(ocr_ms),
                        ocr_skipped_reason: None,
                        issues: 0,
                        total_ms: started.elapsed().as_millis() as u64,
                    })
                    .await;
                return Ok(());
            }
        };
        if std::mem::replace(&mut tracker.ocr_failing, false) {
            self.ctx
                .log
                .append(LogKind::Info, format!("OCR on monitor {monitor_id} recovered"));
        }
        tracker.last_ocr_phash = Some(phash);
        tracker.last_ocr_time = Some(Instant::now());

        for hint in &content.hints {
            if hint.kind == HintKind::ErrorRegion {
                log_debug!(
                    "monitor {} has an error-coloured region at {},{} ({:.0}% of screen)",
                    monitor_id,
                    hint.x,
                    hint.y,
                    hint.coverage * 100.0
                );
            }
        }

        let mut fresh = 0;
        for issue in self.ctx.detector.detect(&content) {
            let key = (monitor_id, issue.keyword.clone());
            if self.reported.contains_key(&key) {
                continue;
            }
            self.reported.insert(key, Instant::now());
            fresh += 1;

            self.ctx.log.append(
                LogKind::Detection,
                format!(
                    "Monitor {}: '{}' detected. {}",
                    monitor_id, issue.keyword, issue.suggested_hint
                ),
            );
            // No subscribers just means nobody is acting on issues right now.
            let _ = self.ctx.issues.send(issue);
        }

        self.ctx
            .metrics
            .record_analysis(AnalysisMetrics {
                timestamp: Utc::now(),
                monitor_id,
                phash_ms,
                ocr_ms: Some(ocr_ms),
                ocr_skipped_reason: None,
                issues: fresh,
                total_ms: started.elapsed().as_millis() as u64,
            })
            .await;
        Ok(())
    }
}

/// OCR runs on the first frame, on any visible change, and on an unchanged
/// screen once the cooldown has passed.
fn ocr_skip_reason(
    current_phash: &str,
    last_ocr_phash: Option<&str>,
    last_ocr_time: Option<&Instant>,
    change_threshold: u32,
    cooldown: Duration,
) -> Option<&'static str> {
    let prev_phash = last_ocr_phash?;
    if compute_hamming_distance(current_phash, prev_phash) >= change_threshold {
        return None;
    }
    let cooled_down = last_ocr_time
        .map(|instant| instant.elapsed() >= cooldown)
        .unwrap_or(true);
    if cooled_down {
        None
    } else {
        Some("screen unchanged")
    }
}
