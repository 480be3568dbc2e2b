use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Process-wide stop signal for automation.
///
/// Setting it is lock-free and idempotent. Only the control state machine can
/// clear it, and only on an explicit user re-arm.
#[derive(Debug, Clone, Default)]
pub struct EmergencyStop {
    flag: Arc<AtomicBool>,
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this call was the one that raised the flag.
    pub fn trigger(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
