use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedIssue {
    pub monitor_id: u32,
    pub keyword: String,
    pub context_snippet: String,
    pub suggested_hint: String,
    pub detected_at: DateTime<Utc>,
}
