use chrono::{NaiveTime, Weekday};

use crate::alarm::model::{Alarm, clamp_label, normalize_weekdays, truncate_to_minute};
use crate::alarm::scheduler::AlarmScheduler;
use crate::alarm::store::AlarmStore;
use crate::alarm::undo::UndoBuffer;
use crate::platform::PlatformError;

/// Cascade-aware mutation layer. Every operation takes the caller's current
/// snapshot, computes the next list, persists it, and returns it synchronously
/// so the caller never needs a re-fetch round trip. Timer registrations are
/// kept in step with each mutation; a scheduling failure is reported by the
/// scheduler and never fails the mutation itself.
///
/// Cascades: `enabled`, `weekdays`, and `vibration_only` flow from a primary
/// to all of its secondaries. Editing a secondary only ever touches that
/// secondary, and `time`/`label` never cascade.
#[derive(Clone)]
pub struct AlarmRepository {
    store: AlarmStore,
    scheduler: AlarmScheduler,
    undo: UndoBuffer,
}

impl AlarmRepository {
    pub fn new(store: AlarmStore, scheduler: AlarmScheduler) -> Self {
        Self {
            store,
            scheduler,
            undo: UndoBuffer::new(),
        }
    }

    pub fn add_alarm(
        &self,
        alarm: Alarm,
        current: &[Alarm],
    ) -> Result<Vec<Alarm>, PlatformError> {
        let mut next = current.to_vec();
        next.push(alarm.clone());
        self.store.save(&next)?;
        if alarm.enabled {
            self.scheduler
                .schedule_alarm(&alarm.id, alarm.time, &alarm.weekdays);
        }
        Ok(next)
    }

    /// Removes `id` and, when it is a primary, all of its secondaries. The
    /// removed group is stashed for a single undo; registrations for every
    /// removed record are cancelled.
    pub fn remove_group(
        &self,
        id: &str,
        current: &[Alarm],
    ) -> Result<Vec<Alarm>, PlatformError> {
        let (removed, kept): (Vec<Alarm>, Vec<Alarm>) =
            current.iter().cloned().partition(|alarm| in_group(alarm, id));
        self.store.save(&kept)?;
        for alarm in &removed {
            self.scheduler.cancel_alarm(&alarm.id);
        }
        if !removed.is_empty() {
            self.undo.stash(removed);
        }
        Ok(kept)
    }

    /// Whether a deleted group is waiting for [`Self::undo_remove`].
    pub fn has_pending_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Re-inserts the most recently deleted group exactly once. Returns
    /// `None` when there is nothing to restore.
    pub fn undo_remove(
        &self,
        current: &[Alarm],
    ) -> Result<Option<Vec<Alarm>>, PlatformError> {
        let Some(group) = self.undo.take() else {
            return Ok(None);
        };
        let mut next = current.to_vec();
        next.extend(group.iter().cloned());
        self.store.save(&next)?;
        for alarm in group.iter().filter(|alarm| alarm.enabled) {
            self.scheduler
                .schedule_alarm(&alarm.id, alarm.time, &alarm.weekdays);
        }
        Ok(Some(next))
    }

    pub fn set_enabled(
        &self,
        id: &str,
        enabled: bool,
        current: &[Alarm],
    ) -> Result<Vec<Alarm>, PlatformError> {
        let next = current
            .iter()
            .map(|alarm| {
                if in_group(alarm, id) {
                    let mut updated = alarm.clone();
                    updated.enabled = enabled;
                    updated
                } else {
                    alarm.clone()
                }
            })
            .collect::<Vec<_>>();
        self.store.save(&next)?;
        for alarm in next.iter().filter(|alarm| in_group(alarm, id)) {
            if enabled {
                self.scheduler
                    .schedule_alarm(&alarm.id, alarm.time, &alarm.weekdays);
            } else {
                self.scheduler.cancel_alarm(&alarm.id);
            }
        }
        Ok(next)
    }

    pub fn set_weekdays(
        &self,
        id: &str,
        weekdays: Vec<Weekday>,
        current: &[Alarm],
    ) -> Result<Vec<Alarm>, PlatformError> {
        let weekdays = normalize_weekdays(weekdays);
        let next = current
            .iter()
            .map(|alarm| {
                if in_group(alarm, id) {
                    let mut updated = alarm.clone();
                    updated.weekdays = weekdays.clone();
                    updated
                } else {
                    alarm.clone()
                }
            })
            .collect::<Vec<_>>();
        self.store.save(&next)?;
        for alarm in next
            .iter()
            .filter(|alarm| in_group(alarm, id) && alarm.enabled)
        {
            self.scheduler
                .schedule_alarm(&alarm.id, alarm.time, &alarm.weekdays);
        }
        Ok(next)
    }

    pub fn set_time(
        &self,
        id: &str,
        time: NaiveTime,
        current: &[Alarm],
    ) -> Result<Vec<Alarm>, PlatformError> {
        let time = truncate_to_minute(time);
        let next = current
            .iter()
            .map(|alarm| {
                if alarm.id == id {
                    let mut updated = alarm.clone();
                    updated.time = time;
                    updated
                } else {
                    alarm.clone()
                }
            })
            .collect::<Vec<_>>();
        self.store.save(&next)?;
        self.scheduler.cancel_alarm(id);
        if let Some(updated) = next.iter().find(|alarm| alarm.id == id)
            && updated.enabled
        {
            self.scheduler
                .schedule_alarm(&updated.id, updated.time, &updated.weekdays);
        }
        Ok(next)
    }

    pub fn set_label(
        &self,
        id: &str,
        label: &str,
        current: &[Alarm],
    ) -> Result<Vec<Alarm>, PlatformError> {
        let label = clamp_label(label);
        let next = current
            .iter()
            .map(|alarm| {
                if alarm.id == id {
                    let mut updated = alarm.clone();
                    updated.label = label.clone();
                    updated
                } else {
                    alarm.clone()
                }
            })
            .collect::<Vec<_>>();
        self.store.save(&next)?;
        Ok(next)
    }

    pub fn set_vibration_only(
        &self,
        id: &str,
        vibration_only: bool,
        current: &[Alarm],
    ) -> Result<Vec<Alarm>, PlatformError> {
        let next = current
            .iter()
            .map(|alarm| {
                if in_group(alarm, id) {
                    let mut updated = alarm.clone();
                    updated.vibration_only = vibration_only;
                    updated
                } else {
                    alarm.clone()
                }
            })
            .collect::<Vec<_>>();
        self.store.save(&next)?;
        Ok(next)
    }
}

/// Target record plus, when the target is a primary, its secondaries. A
/// secondary id never matches another record's `parent_id`, so cascades from
/// a secondary reach nothing but the secondary itself.
fn in_group(alarm: &Alarm, id: &str) -> bool {
    alarm.id == id || alarm.parent_id.as_deref() == Some(id)
}
