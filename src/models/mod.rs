mod issue;
mod log_entry;
mod plan;
mod snapshot;

pub use issue::DetectedIssue;
pub use log_entry::{ActionLogEntry, LogKind};
pub use plan::{ActionPlan, AutomationStep, Intent, Key, PlanOrigin};
pub use snapshot::{ElementHint, ExtractedContent, HintKind, MonitorSnapshot};
