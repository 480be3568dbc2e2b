mod ocr;
mod regions;

#[cfg(feature = "native")]
pub use ocr::UniOcrRecognizer;
pub use ocr::TextRecognizer;
pub use regions::{detect_color_regions, RegionConfig};

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{ExtractedContent, MonitorSnapshot};

/// Turns a snapshot into text plus coarse element hints.
pub struct ContentExtractor {
    recognizer: Arc<dyn TextRecognizer>,
    regions: RegionConfig,
}

impl ContentExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            recognizer,
            regions: RegionConfig::default(),
        }
    }

    /// Blocking: OCR and the colour scan both walk the full frame. A
    /// recognizer error is returned so the caller can report it.
    pub fn extract(&self, snapshot: &MonitorSnapshot) -> Result<ExtractedContent> {
        let raw = self
            .recognizer
            .recognize(&snapshot.image)
            .with_context(|| {
                format!("text recognition failed for monitor {}", snapshot.monitor_id)
            })?;

        Ok(ExtractedContent {
            monitor_id: snapshot.monitor_id,
            text: normalize_text(&raw),
            captured_at: snapshot.captured_at,
            hints: detect_color_regions(&snapshot.image, &self.regions),
        })
    }
}

/// Strips OCR noise: unifies line endings, collapses runs of whitespace and
/// drops lines that carry no letters or digits.
pub fn normalize_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| line.chars().any(char::is_alphanumeric))
        .collect::<Vec<_>>()
        .join("\n")
}
