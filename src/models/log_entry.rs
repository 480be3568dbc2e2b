use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LogKind {
    Transition,
    Detection,
    Step,
    Refusal,
    Failure,
    SafetyStop,
    Info,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Transition => "transition",
            LogKind::Detection => "detection",
            LogKind::Step => "step",
            LogKind::Refusal => "refusal",
            LogKind::Failure => "failure",
            LogKind::SafetyStop => "safety-stop",
            LogKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}
