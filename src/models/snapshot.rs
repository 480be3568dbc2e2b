use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// One frame grabbed from one monitor. Never mutated after capture; shared as
/// `Arc<MonitorSnapshot>` between the capture loop and the analysis loop.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub monitor_id: u32,
    /// Store-assigned, strictly increasing across replacements.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub captured_at: DateTime<Utc>,
    pub image: RgbaImage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum HintKind {
    ErrorRegion,
    WarningRegion,
    SuccessRegion,
}

/// Coarse colour region found on a snapshot, in monitor-local pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementHint {
    pub kind: HintKind,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Fraction of sampled cells that matched, 0.0..=1.0.
    pub coverage: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    pub monitor_id: u32,
    pub text: String,
    pub captured_at: DateTime<Utc>,
    pub hints: Vec<ElementHint>,
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.hints.is_empty()
    }
}
