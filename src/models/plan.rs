use std::{fmt, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DetectedIssue;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Key {
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
    Control,
    Alt,
    Shift,
    Meta,
    Char(char),
}

impl Key {
    pub fn is_modifier(&self) -> bool {
        matches!(self, Key::Control | Key::Alt | Key::Shift | Key::Meta)
    }

    /// Parses `ctrl+shift+p` style combos: modifiers first, then exactly one
    /// ordinary key.
    pub fn parse_combo(combo: &str) -> Result<Vec<Key>> {
        let keys = combo
            .split('+')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Key::from_str)
            .collect::<Result<Vec<_>>>()?;
        let Some((last, modifiers)) = keys.split_last() else {
            bail!("empty key combo '{combo}'");
        };
        if last.is_modifier() || !modifiers.iter().all(Key::is_modifier) {
            bail!("'{combo}' must be modifiers followed by one key");
        }
        Ok(keys)
    }
}

impl FromStr for Key {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        let mut chars = token.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            return Ok(Key::Char(ch));
        }

        let norm = token.to_lowercase();
        let key = match norm.as_str() {
            "enter" | "return" => Key::Enter,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Escape,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "space" => Key::Space,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" => Key::PageUp,
            "pagedown" => Key::PageDown,
            "ctrl" | "control" => Key::Control,
            "alt" | "option" => Key::Alt,
            "shift" => Key::Shift,
            "meta" | "super" | "win" | "cmd" => Key::Meta,
            other => {
                let n = other
                    .strip_prefix('f')
                    .and_then(|rest| rest.parse::<u8>().ok())
                    .filter(|n| (1..=12).contains(n))
                    .ok_or_else(|| anyhow!("unknown key '{token}'"))?;
                Key::F(n)
            }
        };
        Ok(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Enter => write!(f, "Enter"),
            Key::Tab => write!(f, "Tab"),
            Key::Escape => write!(f, "Esc"),
            Key::Backspace => write!(f, "Backspace"),
            Key::Delete => write!(f, "Delete"),
            Key::Space => write!(f, "Space"),
            Key::Up => write!(f, "Up"),
            Key::Down => write!(f, "Down"),
            Key::Left => write!(f, "Left"),
            Key::Right => write!(f, "Right"),
            Key::Home => write!(f, "Home"),
            Key::End => write!(f, "End"),
            Key::PageUp => write!(f, "PageUp"),
            Key::PageDown => write!(f, "PageDown"),
            Key::F(n) => write!(f, "F{n}"),
            Key::Control => write!(f, "Ctrl"),
            Key::Alt => write!(f, "Alt"),
            Key::Shift => write!(f, "Shift"),
            Key::Meta => write!(f, "Meta"),
            Key::Char(c) => write!(f, "{c}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AutomationStep {
    Wait { duration: Duration },
    KeyPress { key: Key },
    Hotkey { keys: Vec<Key> },
    TypeText { text: String },
}

impl AutomationStep {
    pub fn wait_ms(ms: u64) -> Self {
        AutomationStep::Wait {
            duration: Duration::from_millis(ms),
        }
    }

    pub fn key(key: Key) -> Self {
        AutomationStep::KeyPress { key }
    }

    pub fn hotkey(keys: &[Key]) -> Self {
        AutomationStep::Hotkey {
            keys: keys.to_vec(),
        }
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        AutomationStep::TypeText { text: text.into() }
    }

    pub fn describe(&self) -> String {
        match self {
            AutomationStep::Wait { duration } => format!("wait {}ms", duration.as_millis()),
            AutomationStep::KeyPress { key } => format!("press {key}"),
            AutomationStep::Hotkey { keys } => {
                let combo: Vec<String> = keys.iter().map(Key::to_string).collect();
                format!("hotkey {}", combo.join("+"))
            }
            AutomationStep::TypeText { text } => format!("type {} chars", text.chars().count()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FixError,
    Debug,
    SetupSoftware,
    WriteCode,
    General,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::FixError,
        Intent::Debug,
        Intent::SetupSoftware,
        Intent::WriteCode,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FixError => "fix_error",
            Intent::Debug => "debug",
            Intent::SetupSoftware => "setup_software",
            Intent::WriteCode => "write_code",
            Intent::General => "general",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum PlanOrigin {
    Issue(DetectedIssue),
    UserRequest(String),
}

impl PlanOrigin {
    pub fn summary(&self) -> String {
        match self {
            PlanOrigin::Issue(issue) => {
                format!("'{}' on monitor {}", issue.keyword, issue.monitor_id)
            }
            PlanOrigin::UserRequest(text) => format!("request \"{text}\""),
        }
    }
}

/// Ordered, immutable automation plan. Consumed once by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    pub id: String,
    pub origin: PlanOrigin,
    pub intent: Intent,
    pub steps: Vec<AutomationStep>,
    pub created_at: DateTime<Utc>,
}

impl ActionPlan {
    pub fn new(origin: PlanOrigin, intent: Intent, steps: Vec<AutomationStep>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            origin,
            intent,
            steps,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
