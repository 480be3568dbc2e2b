#[cfg(feature = "native")]
mod xcap_source;

#[cfg(feature = "native")]
pub use xcap_source::XcapDisplaySource;

use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// Enumerates monitors and grabs frames from them. Both calls block, so the
/// capture loop runs them on blocking workers.
pub trait DisplaySource: Send + Sync {
    fn list_displays(&self) -> Result<Vec<DisplayInfo>>;
    fn capture(&self, monitor_id: u32) -> Result<RgbaImage>;
}

/// Resolves the monitors to watch. An empty request means every connected
/// monitor; ids that are not connected are dropped with a warning.
pub fn select_monitors(available: &[DisplayInfo], requested: &[u32]) -> Vec<DisplayInfo> {
    let mut selected: Vec<DisplayInfo> = if requested.is_empty() {
        available.to_vec()
    } else {
        for id in requested {
            if !available.iter().any(|display| display.id == *id) {
                log::warn!("monitor {id} is not connected; ignoring it");
            }
        }
        available
            .iter()
            .filter(|display| requested.contains(&display.id))
            .cloned()
            .collect()
    };
    selected.sort_by_key(|display| display.id);
    selected.dedup_by_key(|display| display.id);
    selected
}

/// The primary display, or the first one when none is flagged primary.
pub fn primary_display(displays: &[DisplayInfo]) -> Option<&DisplayInfo> {
    displays
        .iter()
        .find(|display| display.is_primary)
        .or_else(|| displays.first())
}
