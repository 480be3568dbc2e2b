use anyhow::{anyhow, Result};
use image::RgbaImage;
use xcap::Monitor;

use super::{DisplayInfo, DisplaySource};

#[derive(Debug, Default)]
pub struct XcapDisplaySource;

impl XcapDisplaySource {
    pub fn new() -> Self {
        Self
    }

    fn monitors() -> Result<Vec<Monitor>> {
        Monitor::all().map_err(|e| anyhow!("failed to enumerate monitors: {e}"))
    }
}

impl DisplaySource for XcapDisplaySource {
    fn list_displays(&self) -> Result<Vec<DisplayInfo>> {
        Self::monitors()?
            .iter()
            .map(|monitor| -> Result<DisplayInfo> {
                Ok(DisplayInfo {
                    id: monitor.id().map_err(|e| anyhow!("monitor id: {e}"))?,
                    name: monitor.name().unwrap_or_default(),
                    x: monitor.x().map_err(|e| anyhow!("monitor x: {e}"))?,
                    y: monitor.y().map_err(|e| anyhow!("monitor y: {e}"))?,
                    width: monitor.width().map_err(|e| anyhow!("monitor width: {e}"))?,
                    height: monitor.height().map_err(|e| anyhow!("monitor height: {e}"))?,
                    is_primary: monitor.is_primary().unwrap_or(false),
                })
            })
            .collect()
    }

    fn capture(&self, monitor_id: u32) -> Result<RgbaImage> {
        let monitor = Self::monitors()?
            .into_iter()
            .find(|monitor| monitor.id().map(|id| id == monitor_id).unwrap_or(false))
            .ok_or_else(|| anyhow!("monitor {monitor_id} not found"))?;
        monitor
            .capture_image()
            .map_err(|e| anyhow!("capture of monitor {monitor_id} failed: {e}"))
    }
}
