use chrono::{
    DateTime, Datelike, Days, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Weekday,
};

use crate::alarm::model::truncate_to_minute;

/// Next instant at which an alarm with this time-of-day and weekday set
/// fires, strictly after `now`. Equality with `now` is never eligible, so
/// setting a schedule at exactly its own time never fires immediately.
pub fn next_trigger(
    time: NaiveTime,
    weekdays: &[Weekday],
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    next_trigger_in_tz(time, weekdays, &now, &Local)
}

/// Timezone-generic form of [`next_trigger`].
///
/// Empty weekday set: today at `time` when that is still ahead, otherwise
/// tomorrow. Non-empty set: the first day offset in 0..=7 whose weekday is in
/// the set and whose instant lies ahead; scanning through offset 7 guarantees
/// a match for any non-empty set. Local times erased by a DST gap are skipped
/// to the next candidate day; ambiguous times resolve to the first instance.
pub fn next_trigger_in_tz<Tz>(
    time: NaiveTime,
    weekdays: &[Weekday],
    now: &DateTime<Tz>,
    timezone: &Tz,
) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let time = truncate_to_minute(time);

    if weekdays.is_empty() {
        for day_offset in 0_u64..4 {
            let date = now.date_naive().checked_add_days(Days::new(day_offset))?;
            let candidate = match resolve_local_datetime(timezone, date.and_time(time)) {
                Some(value) => value,
                None => continue,
            };
            if candidate > *now {
                return Some(candidate);
            }
        }
        return None;
    }

    for day_offset in 0_u64..=7 {
        let date = now.date_naive().checked_add_days(Days::new(day_offset))?;
        if !weekdays.contains(&date.weekday()) {
            continue;
        }
        let candidate = match resolve_local_datetime(timezone, date.and_time(time)) {
            Some(value) => value,
            None => continue,
        };
        if candidate > *now {
            return Some(candidate);
        }
    }

    None
}

fn resolve_local_datetime<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => None,
    }
}
