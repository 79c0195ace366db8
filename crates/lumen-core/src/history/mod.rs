// ── Command history ──
//
// Linear undo/redo log. An `Operation` is recorded only after every
// setting in it was acknowledged, and carries both directions as
// absolute settings so undo and redo need no other context.

pub mod snapshot;

use std::collections::VecDeque;
use std::future::Future;

use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{DeviceState, Setting};

pub use snapshot::SnapshotRing;

/// Applies settings to a device and reports the resulting state.
pub trait OperationExecutor: Send {
    fn state(&self) -> &DeviceState;

    /// Apply settings in order, stopping at the first failure. Settings
    /// acknowledged before the failure stay applied.
    fn apply(&mut self, settings: &[Setting]) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// One reversible, self-contained history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub label: String,
    /// Settings that redo the operation.
    pub forward: Vec<Setting>,
    /// Previous values, captured at execution time.
    pub backward: Vec<Setting>,
}

#[derive(Debug)]
pub struct CommandHistory {
    entries: VecDeque<Operation>,
    /// Index of the last applied entry; `None` when nothing is undoable.
    cursor: Option<usize>,
    max: usize,
}

impl CommandHistory {
    pub fn new(max: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            max: max.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.next_redo() < self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    fn next_redo(&self) -> usize {
        self.cursor.map_or(0, |c| c + 1)
    }

    /// Apply `settings` and record the change.
    ///
    /// Returns `Ok(false)` when the device state did not change, in which
    /// case nothing is recorded. On failure history is untouched.
    pub async fn execute<E: OperationExecutor>(
        &mut self,
        executor: &mut E,
        label: impl Into<String>,
        settings: &[Setting],
    ) -> Result<bool, CoreError> {
        let before = executor.state().clone();
        executor.apply(settings).await?;
        let after = executor.state().clone();

        let backward = after.diff(&before);
        if backward.is_empty() {
            return Ok(false);
        }

        let next = self.next_redo();
        self.entries.truncate(next);
        self.entries.push_back(Operation {
            label: label.into(),
            forward: before.diff(&after),
            backward,
        });
        while self.entries.len() > self.max {
            self.entries.pop_front();
        }
        self.cursor = Some(self.entries.len() - 1);
        debug!(len = self.entries.len(), "history recorded");
        Ok(true)
    }

    /// Revert the entry at the cursor. `Ok(false)` when there is nothing
    /// to undo; on failure the cursor does not move.
    pub async fn undo<E: OperationExecutor>(&mut self, executor: &mut E) -> Result<bool, CoreError> {
        let Some(index) = self.cursor else {
            return Ok(false);
        };
        let Some(op) = self.entries.get(index) else {
            return Ok(false);
        };
        executor.apply(&op.backward).await?;
        self.cursor = index.checked_sub(1);
        Ok(true)
    }

    /// Re-apply the entry after the cursor. `Ok(false)` when there is
    /// nothing to redo; on failure the cursor does not move.
    pub async fn redo<E: OperationExecutor>(&mut self, executor: &mut E) -> Result<bool, CoreError> {
        let index = self.next_redo();
        let Some(op) = self.entries.get(index) else {
            return Ok(false);
        };
        executor.apply(&op.forward).await?;
        self.cursor = Some(index);
        Ok(true)
    }

    /// Label of the entry `undo` would revert.
    pub fn undo_label(&self) -> Option<&str> {
        self.cursor
            .and_then(|c| self.entries.get(c))
            .map(|op| op.label.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::Rgb;

    #[derive(Default)]
    struct Fake {
        state: DeviceState,
        fail: bool,
        applied: usize,
    }

    impl OperationExecutor for Fake {
        fn state(&self) -> &DeviceState {
            &self.state
        }

        async fn apply(&mut self, settings: &[Setting]) -> Result<(), CoreError> {
            if self.fail {
                return Err(CoreError::Connection {
                    reason: "link down".into(),
                });
            }
            for s in settings {
                self.state.apply(s);
                self.applied += 1;
            }
            Ok(())
        }
    }

    fn invariants(h: &CommandHistory) {
        assert_eq!(h.can_undo(), h.cursor().is_some());
        let redoable = match h.cursor() {
            Some(c) => c + 1 < h.len(),
            None => !h.is_empty(),
        };
        assert_eq!(h.can_redo(), redoable);
        if let Some(c) = h.cursor() {
            assert!(c < h.len());
        }
    }

    #[tokio::test]
    async fn undo_restores_previous_color_and_redo_reapplies() {
        let mut dev = Fake::default();
        let mut h = CommandHistory::new(50);
        let b = dev.state.color;
        let a = Rgb::new(255, 0, 0);

        assert!(h.execute(&mut dev, "color", &[Setting::Color(a)]).await.unwrap());
        invariants(&h);
        assert!(h.undo(&mut dev).await.unwrap());
        assert_eq!(dev.state.color, b);
        invariants(&h);
        assert!(h.redo(&mut dev).await.unwrap());
        assert_eq!(dev.state.color, a);
        invariants(&h);
        assert!(!h.redo(&mut dev).await.unwrap());
    }

    #[tokio::test]
    async fn new_command_after_undo_discards_the_redo_branch() {
        let mut dev = Fake::default();
        let mut h = CommandHistory::new(50);
        for level in [10, 20, 30] {
            h.execute(&mut dev, "brightness", &[Setting::Brightness(level)])
                .await
                .unwrap();
        }
        h.undo(&mut dev).await.unwrap();
        h.undo(&mut dev).await.unwrap();
        assert!(h.can_redo());

        h.execute(&mut dev, "brightness", &[Setting::Brightness(99)])
            .await
            .unwrap();
        assert!(!h.can_redo());
        assert_eq!(h.len(), 2);
        invariants(&h);
    }

    #[tokio::test]
    async fn eviction_keeps_the_cursor_in_bounds() {
        let mut dev = Fake::default();
        let mut h = CommandHistory::new(3);
        for level in 1..=5 {
            h.execute(&mut dev, "brightness", &[Setting::Brightness(level)])
                .await
                .unwrap();
            invariants(&h);
            assert!(h.len() <= 3);
        }
        assert_eq!(h.cursor(), Some(2));
        while h.undo(&mut dev).await.unwrap() {
            invariants(&h);
        }
        // The oldest two entries were evicted, so undo stops at level 2.
        assert_eq!(dev.state.brightness, 2);
    }

    #[tokio::test]
    async fn failures_leave_history_untouched() {
        let mut dev = Fake::default();
        let mut h = CommandHistory::new(50);
        h.execute(&mut dev, "color", &[Setting::Color(Rgb::BLACK)])
            .await
            .unwrap();

        dev.fail = true;
        assert!(
            h.execute(&mut dev, "brightness", &[Setting::Brightness(5)])
                .await
                .is_err()
        );
        assert_eq!(h.len(), 1);
        assert!(h.undo(&mut dev).await.is_err());
        assert_eq!(h.cursor(), Some(0));
        invariants(&h);
    }

    #[tokio::test]
    async fn no_op_changes_are_not_recorded() {
        let mut dev = Fake::default();
        let mut h = CommandHistory::new(50);
        let same = Setting::Brightness(dev.state.brightness);
        assert!(!h.execute(&mut dev, "brightness", &[same]).await.unwrap());
        assert!(h.is_empty());
        assert!(!h.undo(&mut dev).await.unwrap());
        assert_eq!(dev.applied, 1);
    }
}
