use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

pub const MAX_STOP_POLL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SafeCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Default for SafeCorner {
    fn default() -> Self {
        SafeCorner::TopLeft
    }
}

impl SafeCorner {
    /// Pointer position for this corner of a display, inset by one pixel so it
    /// stays on-screen.
    pub fn point(&self, origin_x: i32, origin_y: i32, width: u32, height: u32) -> (i32, i32) {
        let right = origin_x + width.saturating_sub(1) as i32;
        let bottom = origin_y + height.saturating_sub(1) as i32;
        match self {
            SafeCorner::TopLeft => (origin_x, origin_y),
            SafeCorner::TopRight => (right, origin_y),
            SafeCorner::BottomLeft => (origin_x, bottom),
            SafeCorner::BottomRight => (right, bottom),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentSettings {
    pub capture_interval_ms: u64,
    pub analysis_interval_ms: u64,
    pub stop_poll_interval_ms: u64,
    pub step_pacing_ms: u64,
    pub issue_cooldown_secs: u64,
    /// Minimum perceptual-hash distance that counts as "the screen changed".
    pub ocr_change_threshold: u32,
    pub ocr_cooldown_secs: u64,
    /// Feed detected issues to the planner while automation is armed.
    pub auto_remediate: bool,
    pub safe_corner: SafeCorner,
    /// Monitors watched when `start_monitoring` gets an empty list; empty means all.
    pub default_monitors: Vec<u32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            capture_interval_ms: 100,
            analysis_interval_ms: 1000,
            stop_poll_interval_ms: 50,
            step_pacing_ms: 150,
            issue_cooldown_secs: 30,
            ocr_change_threshold: 8,
            ocr_cooldown_secs: 5,
            auto_remediate: true,
            safe_corner: SafeCorner::TopLeft,
            default_monitors: Vec::new(),
        }
    }
}

impl AgentSettings {
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms.max(1))
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms.max(1))
    }

    /// Stop latency is bounded by this slice, so it never exceeds 100 ms.
    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms.clamp(1, MAX_STOP_POLL_MS))
    }

    pub fn step_pacing(&self) -> Duration {
        Duration::from_millis(self.step_pacing_ms)
    }

    pub fn issue_cooldown(&self) -> Duration {
        Duration::from_secs(self.issue_cooldown_secs)
    }

    pub fn ocr_cooldown(&self) -> Duration {
        Duration::from_secs(self.ocr_cooldown_secs)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AgentSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings in {}: {err}",
                    path.display()
                );
                AgentSettings::default()
            })
        } else {
            AgentSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// `SCREENGUARD_SETTINGS` if set, otherwise `./screenguard.json`.
    pub fn default_path() -> PathBuf {
        std::env::var_os("SCREENGUARD_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("screenguard.json"))
    }

    pub fn get(&self) -> AgentSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: AgentSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &AgentSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
