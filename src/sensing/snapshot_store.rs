use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::models::MonitorSnapshot;

/// Holds at most one snapshot per monitor: the newest.
///
/// Writers replace, readers clone the `Arc`. Old frames are dropped as soon as
/// the last reader lets go of them, so memory stays bounded by the monitor
/// count.
#[derive(Default)]
pub struct LatestSnapshots {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    frames: HashMap<u32, Arc<MonitorSnapshot>>,
    next_sequence: u64,
}

impl LatestSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `snapshot` as the latest for its monitor and stamps it with a
    /// fresh sequence number.
    pub fn replace(&self, mut snapshot: MonitorSnapshot) -> Arc<MonitorSnapshot> {
        let mut inner = self.lock();
        inner.next_sequence += 1;
        snapshot.sequence = inner.next_sequence;
        let snapshot = Arc::new(snapshot);
        inner
            .frames
            .insert(snapshot.monitor_id, Arc::clone(&snapshot));
        snapshot
    }

    pub fn latest(&self, monitor_id: u32) -> Option<Arc<MonitorSnapshot>> {
        self.lock().frames.get(&monitor_id).cloned()
    }

    /// Latest frame of every monitor, ordered by monitor id.
    pub fn latest_all(&self) -> Vec<Arc<MonitorSnapshot>> {
        let inner = self.lock();
        let mut frames: Vec<Arc<MonitorSnapshot>> = inner.frames.values().cloned().collect();
        frames.sort_by_key(|frame| frame.monitor_id);
        frames
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().frames.clear();
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::RgbaImage;

    fn frame(monitor_id: u32) -> MonitorSnapshot {
        MonitorSnapshot {
            monitor_id,
            sequence: 0,
            width: 4,
            height: 4,
            origin_x: 0,
            origin_y: 0,
            captured_at: Utc::now(),
            image: RgbaImage::new(4, 4),
        }
    }

    #[test]
    fn keeps_only_the_newest_frame_per_monitor() {
        let store = LatestSnapshots::new();
        for _ in 0..10 {
            store.replace(frame(1));
            store.replace(frame(2));
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.latest(1).map(|s| s.sequence), Some(19));
        assert_eq!(store.latest(2).map(|s| s.sequence), Some(20));
    }

    #[test]
    fn sequences_increase_across_monitors() {
        let store = LatestSnapshots::new();
        let a = store.replace(frame(2));
        let b = store.replace(frame(1));
        assert!(b.sequence > a.sequence);

        let ids: Vec<u32> = store.latest_all().iter().map(|s| s.monitor_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn replaced_frames_are_released() {
        let store = LatestSnapshots::new();
        let first = store.replace(frame(1));
        store.replace(frame(1));
        assert_eq!(Arc::strong_count(&first), 1);

        store.clear();
        assert!(store.is_empty());
        assert!(store.latest(1).is_none());
    }
}
