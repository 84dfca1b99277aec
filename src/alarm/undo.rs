use std::sync::{Arc, Mutex};

use crate::alarm::model::Alarm;

/// One-slot holder for the most recently deleted alarm group. Stashing
/// replaces any previous content; the group can be taken back exactly once.
#[derive(Clone, Default)]
pub struct UndoBuffer {
    slot: Arc<Mutex<Option<Vec<Alarm>>>>,
}

impl UndoBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stash(&self, group: Vec<Alarm>) {
        *self.lock_slot() = Some(group);
    }

    pub fn take(&self) -> Option<Vec<Alarm>> {
        self.lock_slot().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_slot().is_none()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<Vec<Alarm>>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
