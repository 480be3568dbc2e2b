use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    action_log::ActionLog,
    display::{DisplayInfo, DisplaySource},
    metrics::MetricsCollector,
    models::{LogKind, MonitorSnapshot},
};

use super::snapshot_store::LatestSnapshots;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub struct CaptureContext {
    pub source: Arc<dyn DisplaySource>,
    pub monitors: Vec<DisplayInfo>,
    pub store: Arc<LatestSnapshots>,
    pub metrics: MetricsCollector,
    pub log: ActionLog,
    pub interval: Duration,
}

#[derive(Default)]
struct MonitorSlot {
    in_flight: AtomicBool,
    failing: AtomicBool,
}

/// Grabs every selected monitor once per tick. A monitor whose previous grab
/// is still running skips the tick; the other monitors are unaffected.
pub async fn capture_loop(ctx: CaptureContext, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let slots: HashMap<u32, Arc<MonitorSlot>> = ctx
        .monitors
        .iter()
        .map(|display| (display.id, Arc::new(MonitorSlot::default())))
        .collect();
    let mut tasks = JoinSet::new();

    log_info!(
        "capture loop started for {} monitor(s) every {}ms",
        ctx.monitors.len(),
        ctx.interval.as_millis()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                while tasks.try_join_next().is_some() {}

                for display in &ctx.monitors {
                    let Some(slot) = slots.get(&display.id) else {
                        continue;
                    };
                    if slot.in_flight.swap(true, Ordering::SeqCst) {
                        log_debug!("monitor {} still capturing; skipping tick", display.id);
                        ctx.metrics.record_capture_skipped().await;
                        continue;
                    }
                    tasks.spawn(capture_monitor(
                        Arc::clone(&ctx.source),
                        display.clone(),
                        Arc::clone(slot),
                        Arc::clone(&ctx.store),
                        ctx.metrics.clone(),
                        ctx.log.clone(),
                    ));
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down");
                break;
            }
        }
    }

    // Grabs already on a blocking worker finish there; their frames are dropped.
    tasks.shutdown().await;
}

async fn capture_monitor(
    source: Arc<dyn DisplaySource>,
    display: DisplayInfo,
    slot: Arc<MonitorSlot>,
    store: Arc<LatestSnapshots>,
    metrics: MetricsCollector,
    log: ActionLog,
) {
    let started = Instant::now();
    let monitor_id = display.id;
    let result = tokio::task::spawn_blocking(move || source.capture(monitor_id)).await;
    slot.in_flight.store(false, Ordering::SeqCst);

    let error = match result {
        Ok(Ok(image)) => {
            let snapshot = MonitorSnapshot {
                monitor_id,
                sequence: 0,
                width: image.width(),
                height: image.height(),
                origin_x: display.x,
                origin_y: display.y,
                captured_at: Utc::now(),
                image,
            };
            let stored = store.replace(snapshot);
            metrics.record_capture(true).await;
            if slot.failing.swap(false, Ordering::SeqCst) {
                log.append(
                    LogKind::Info,
                    format!("Capture of monitor {monitor_id} recovered"),
                );
            }
            log_debug!(
                "captured monitor {} (seq {}) in {}ms",
                monitor_id,
                stored.sequence,
                started.elapsed().as_millis()
            );
            return;
        }
        Ok(Err(err)) => format!("{err:#}"),
        Err(join_err) => format!("capture worker join failed: {join_err}"),
    };

    metrics.record_capture(false).await;
    // Only the first failure of a streak reaches the action log.
    if !slot.failing.swap(true, Ordering::SeqCst) {
        log.append(
            LogKind::Failure,
            format!("Capture of monitor {monitor_id} failed: {error}"),
        );
    } else {
        log_warn!("capture of monitor {} failed again: {}", monitor_id, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::fake::FakeDisplays;

    fn context(source: Arc<FakeDisplays>, interval_ms: u64) -> (CaptureContext, ActionLog) {
        let log = ActionLog::new();
        let monitors = source.displays.clone();
        let ctx = CaptureContext {
            source,
            monitors,
            store: Arc::new(LatestSnapshots::new()),
            metrics: MetricsCollector::new(),
            log: log.clone(),
            interval: Duration::from_millis(interval_ms),
        };
        (ctx, log)
    }

    #[tokio::test]
    async fn fills_the_store_with_one_frame_per_monitor() {
        let source = Arc::new(FakeDisplays::new(&[1, 2]));
        let (ctx, _log) = context(Arc::clone(&source), 10);
        let store = Arc::clone(&ctx.store);
        let token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(ctx, token.clone()));

        tokio::time::sleep(Duration::from_millis(120)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(source.captures.load(Ordering::SeqCst) > 2);
        let first = store.latest(1).unwrap();
        assert_eq!((first.width, first.height), (64, 48));
    }

    #[tokio::test]
    async fn slow_capture_skips_ticks_instead_of_queueing() {
        let source = Arc::new(FakeDisplays::new(&[1]).with_delay(Duration::from_millis(150)));
        let (ctx, _log) = context(Arc::clone(&source), 10);
        let metrics = ctx.metrics.clone();
        let token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(ctx, token.clone()));

        tokio::time::sleep(Duration::from_millis(400)).await;
        token.cancel();
        handle.await.unwrap();

        let counters = metrics.counters().await;
        assert!(counters.capture_skip_count > 0);
        assert!(source.captures.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failing_monitor_is_logged_once_and_others_continue() {
        let source = Arc::new(FakeDisplays::new(&[1, 2]));
        source.fail(2);
        let (ctx, log) = context(Arc::clone(&source), 10);
        let store = Arc::clone(&ctx.store);
        let token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(ctx, token.clone()));

        tokio::time::sleep(Duration::from_millis(120)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(store.latest(1).is_some());
        assert!(store.latest(2).is_none());
        let failures = log
            .entries()
            .into_iter()
            .filter(|e| e.kind == LogKind::Failure)
            .count();
        assert_eq!(failures, 1);
    }
}
