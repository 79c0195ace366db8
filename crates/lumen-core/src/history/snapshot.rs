// ── Snapshot ring ──
//
// Bounded, newest-first list of full-state mementos. Independent of the
// command log: it survives reconnects and can be persisted.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::{DeviceSnapshot, DeviceState};

#[derive(Debug, Clone)]
pub struct SnapshotRing {
    items: VecDeque<Arc<DeviceSnapshot>>,
    capacity: usize,
}

impl SnapshotRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from a persisted list (newest first), dropping overflow.
    pub fn restore(snapshots: Vec<DeviceSnapshot>, capacity: usize) -> Self {
        let mut ring = Self::new(capacity);
        ring.items = snapshots
            .into_iter()
            .take(ring.capacity)
            .map(Arc::new)
            .collect();
        ring
    }

    /// Record `state` unless it equals the newest snapshot. Returns the
    /// new snapshot when one was taken.
    pub fn capture(&mut self, state: &DeviceState) -> Option<Arc<DeviceSnapshot>> {
        if self.latest().is_some_and(|s| &s.state == state) {
            return None;
        }
        let snapshot = DeviceSnapshot::capture(state);
        self.items.push_front(snapshot.clone());
        self.items.truncate(self.capacity);
        Some(snapshot)
    }

    /// Snapshot by position, 0 being the newest.
    pub fn get(&self, index: usize) -> Option<Arc<DeviceSnapshot>> {
        self.items.get(index).cloned()
    }

    pub fn latest(&self) -> Option<&Arc<DeviceSnapshot>> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Arc<DeviceSnapshot>> {
        self.items.iter().cloned().collect()
    }

    /// Owned copies for persistence, newest first.
    pub fn persisted(&self) -> Vec<DeviceSnapshot> {
        self.items.iter().map(|s| DeviceSnapshot::clone(s)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn with_brightness(level: u8) -> DeviceState {
        DeviceState {
            brightness: level,
            ..DeviceState::default()
        }
    }

    #[test]
    fn keeps_the_newest_up_to_capacity() {
        let mut ring = SnapshotRing::new(3);
        for level in 1..=5 {
            ring.capture(&with_brightness(level));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.get(0).unwrap().state.brightness, 5);
        assert_eq!(ring.get(2).unwrap().state.brightness, 3);
        assert!(ring.get(3).is_none());
    }

    #[test]
    fn identical_consecutive_states_are_skipped() {
        let mut ring = SnapshotRing::new(5);
        assert!(ring.capture(&with_brightness(7)).is_some());
        assert!(ring.capture(&with_brightness(7)).is_none());
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn snapshots_are_shared_not_copied() {
        let mut ring = SnapshotRing::new(5);
        let taken = ring.capture(&with_brightness(9)).unwrap();
        assert!(Arc::ptr_eq(&taken, &ring.get(0).unwrap()));
    }

    #[test]
    fn persisted_form_round_trips_through_json() {
        let mut ring = SnapshotRing::new(4);
        ring.capture(&with_brightness(1));
        ring.capture(&with_brightness(2));

        let json = serde_json::to_string(&ring.persisted()).unwrap();
        let back = SnapshotRing::restore(serde_json::from_str(&json).unwrap(), 1);
        assert_eq!(back.len(), 1);
        assert_eq!(back.latest().unwrap().state.brightness, 2);
    }
}
