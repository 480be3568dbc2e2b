use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;

use crate::models::{ActionLogEntry, LogKind};

const STREAM_CAPACITY: usize = 256;

/// Append-only, timestamped record of transitions, detections and steps.
///
/// Entries are kept for the whole session and mirrored to the `log` facade.
/// Display sinks subscribe to the broadcast stream; a lagging subscriber loses
/// stream items but never the stored history.
#[derive(Clone)]
pub struct ActionLog {
    entries: Arc<Mutex<Vec<ActionLogEntry>>>,
    stream: broadcast::Sender<ActionLogEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            stream,
        }
    }

    /// Timestamps, stores and streams the entry under one lock, so history
    /// and subscribers see the same order.
    pub fn append(&self, kind: LogKind, message: impl Into<String>) -> ActionLogEntry {
        let message = message.into();
        match kind {
            LogKind::Failure | LogKind::SafetyStop => {
                log::warn!("[{}] {}", kind.as_str(), message)
            }
            _ => log::info!("[{}] {}", kind.as_str(), message),
        }

        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = ActionLogEntry {
            timestamp: Utc::now(),
            kind,
            message,
        };
        guard.push(entry.clone());
        // No subscribers is fine; history is still kept.
        let _ = self.stream.send(entry.clone());
        entry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActionLogEntry> {
        self.stream.subscribe()
    }

    pub fn entries(&self) -> Vec<ActionLogEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new()
    }
}
