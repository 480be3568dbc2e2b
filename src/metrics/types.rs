use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    pub timestamp: DateTime<Utc>,
    pub monitor_id: u32,
    pub phash_ms: u64,
    pub ocr_ms: Option<u64>,
    pub ocr_skipped_reason: Option<String>,
    pub issues: usize,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCounters {
    pub capture_count: u64,
    pub capture_failure_count: u64,
    pub capture_skip_count: u64,
    pub analysis_count: u64,
    pub ocr_count: u64,
    pub ocr_skip_count: u64,
    pub issue_count: u64,
    pub plans_completed: u64,
    pub plans_refused: u64,
    pub plans_failed: u64,
    pub plans_stopped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_analyses: Vec<AnalysisMetrics>,
    pub counters: PipelineCounters,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            system: SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            },
            recent_analyses: Vec::new(),
            counters: PipelineCounters::default(),
        }
    }
}
