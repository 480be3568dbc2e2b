mod types;

pub use types::{AnalysisMetrics, MetricsSnapshot, PipelineCounters, SystemMetrics};

use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

use crate::automation::ExecutionOutcome;

const MAX_RECENT_ANALYSES: usize = 20;

pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_analyses: Vec<AnalysisMetrics>,
    counters: PipelineCounters,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // Initial refresh to establish baseline for CPU calculation
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_analyses: Vec::with_capacity(MAX_RECENT_ANALYSES),
                counters: PipelineCounters::default(),
                system,
                pid,
            })),
        }
    }

    pub async fn record_capture(&self, succeeded: bool) {
        let mut state = self.inner.lock().await;
        if succeeded {
            state.counters.capture_count += 1;
        } else {
            state.counters.capture_failure_count += 1;
        }
    }

    pub async fn record_capture_skipped(&self) {
        self.inner.lock().await.counters.capture_skip_count += 1;
    }

    pub async fn record_analysis(&self, metrics: AnalysisMetrics) {
        let mut state = self.inner.lock().await;

        state.counters.analysis_count += 1;
        if metrics.ocr_ms.is_some() {
            state.counters.ocr_count += 1;
        } else if metrics.ocr_skipped_reason.is_some() {
            state.counters.ocr_skip_count += 1;
        }
        state.counters.issue_count += metrics.issues as u64;

        state.recent_analyses.push(metrics);
        if state.recent_analyses.len() > MAX_RECENT_ANALYSES {
            state.recent_analyses.remove(0);
        }
    }

    pub async fn record_outcome(&self, outcome: &ExecutionOutcome) {
        let mut state = self.inner.lock().await;
        match outcome {
            ExecutionOutcome::Completed { .. } => state.counters.plans_completed += 1,
            ExecutionOutcome::Refused { .. } => state.counters.plans_refused += 1,
            ExecutionOutcome::Failed { .. } => state.counters.plans_failed += 1,
            ExecutionOutcome::Stopped { .. } => state.counters.plans_stopped += 1,
        }
    }

    pub async fn counters(&self) -> PipelineCounters {
        self.inner.lock().await.counters.clone()
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let pid = state.pid;

        // Refresh to get current CPU/RAM
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system_metrics = if let Some(process) = state.system.process(pid) {
            SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            }
        } else {
            SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            }
        };

        MetricsSnapshot {
            system: system_metrics,
            recent_analyses: state.recent_analyses.clone(),
            counters: state.counters.clone(),
        }
    }

}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
