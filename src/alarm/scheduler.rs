use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, NaiveTime, Weekday};

use crate::alarm::model::Alarm;
use crate::alarm::trigger::next_trigger;
use crate::platform::{TimerKey, TimerPrecision, WakeTimerService};

/// Maps alarms onto platform wake timer registrations. Each alarm id owns at
/// most one main registration (replaced on every re-schedule) plus an
/// independent snooze registration. Registration failures are reported, never
/// propagated: a broken timer service must not fail the data mutation that
/// triggered the re-schedule.
#[derive(Clone)]
pub struct AlarmScheduler {
    timers: Arc<dyn WakeTimerService>,
    scheduled: Arc<Mutex<HashMap<String, DateTime<Local>>>>,
}

impl AlarmScheduler {
    pub fn new(timers: Arc<dyn WakeTimerService>) -> Self {
        Self {
            timers,
            scheduled: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn schedule_alarm(&self, id: &str, time: NaiveTime, weekdays: &[Weekday]) {
        self.schedule_alarm_at(id, time, weekdays, Local::now());
    }

    pub fn schedule_alarm_at(
        &self,
        id: &str,
        time: NaiveTime,
        weekdays: &[Weekday],
        now: DateTime<Local>,
    ) {
        let Some(at) = next_trigger(time, weekdays, now) else {
            log::warn!("no upcoming occurrence for alarm {id}, leaving it unscheduled");
            self.lock_scheduled().remove(id);
            return;
        };
        match self
            .timers
            .register(TimerKey::Main(id.to_string()), at, self.effective_precision())
        {
            Ok(()) => {
                self.lock_scheduled().insert(id.to_string(), at);
                log::debug!("alarm {id} scheduled for {at}");
            }
            Err(err) => {
                log::error!("failed to schedule alarm {id}: {err}");
                self.lock_scheduled().remove(id);
            }
        }
    }

    /// Registers a one-shot snooze `minutes` from now, keyed separately from
    /// the id's main registration and ignoring the weekday set.
    pub fn schedule_snooze(&self, id: &str, minutes: i64) {
        self.schedule_snooze_at(id, minutes, Local::now());
    }

    pub fn schedule_snooze_at(&self, id: &str, minutes: i64, now: DateTime<Local>) {
        let at = now + Duration::minutes(minutes);
        match self
            .timers
            .register(TimerKey::Snooze(id.to_string()), at, self.effective_precision())
        {
            Ok(()) => log::debug!("snooze for alarm {id} scheduled at {at}"),
            Err(err) => log::error!("failed to schedule snooze for alarm {id}: {err}"),
        }
    }

    /// Cancels the main and any pending snooze registration for `id`.
    /// Idempotent: cancelling an unscheduled id is a no-op.
    pub fn cancel_alarm(&self, id: &str) {
        self.timers.cancel(&TimerKey::Main(id.to_string()));
        self.timers.cancel(&TimerKey::Snooze(id.to_string()));
        self.lock_scheduled().remove(id);
        log::debug!("alarm {id} cancelled");
    }

    pub fn can_schedule_exact(&self) -> bool {
        self.timers.can_schedule_exact()
    }

    /// The instant the id's main registration will fire, or `None` when
    /// unscheduled.
    pub fn next_occurrence(&self, id: &str) -> Option<DateTime<Local>> {
        self.lock_scheduled().get(id).copied()
    }

    /// Re-registers every enabled alarm. Used for the initial snapshot and
    /// after a boot-completed event, when all platform registrations are gone.
    pub fn resubmit_enabled(&self, alarms: &[Alarm]) {
        self.resubmit_enabled_at(alarms, Local::now());
    }

    pub fn resubmit_enabled_at(&self, alarms: &[Alarm], now: DateTime<Local>) {
        let enabled = alarms.iter().filter(|alarm| alarm.enabled);
        let mut count = 0_usize;
        for alarm in enabled {
            self.schedule_alarm_at(&alarm.id, alarm.time, &alarm.weekdays, now);
            count += 1;
        }
        log::info!("resubmitted {count} enabled alarm registrations");
    }

    fn effective_precision(&self) -> TimerPrecision {
        if self.timers.can_schedule_exact() {
            TimerPrecision::Exact
        } else {
            log::warn!("exact wake capability not granted, using best-effort timer");
            TimerPrecision::BestEffort
        }
    }

    fn lock_scheduled(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Local>>> {
        self.scheduled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
