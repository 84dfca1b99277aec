use std::collections::HashSet;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub const MAX_LABEL_LEN: usize = 100;

const PAYLOAD_VERSION: u32 = 1;

/// One alarm record. A record with no `parent_id` is a primary; a record
/// carrying `parent_id` is a secondary tied to that primary. The list is flat
/// and parent/child lookups are filtered scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub id: String,
    pub parent_id: Option<String>,
    pub time: NaiveTime,
    pub enabled: bool,
    pub weekdays: Vec<Weekday>,
    pub label: String,
    pub vibration_only: bool,
}

impl Alarm {
    pub fn new_primary(time: NaiveTime, weekdays: Vec<Weekday>, label: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
            time: truncate_to_minute(time),
            enabled: true,
            weekdays: normalize_weekdays(weekdays),
            label: clamp_label(label),
            vibration_only: false,
        }
    }

    /// Snapshots the parent's `weekdays`, `enabled`, and `vibration_only` at
    /// creation time. There is no live inheritance afterwards; only the
    /// primary-to-secondary cascades in the repository apply.
    pub fn new_child(parent: &Alarm, time: NaiveTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: Some(parent.id.clone()),
            time: truncate_to_minute(time),
            enabled: parent.enabled,
            weekdays: parent.weekdays.clone(),
            label: String::new(),
            vibration_only: parent.vibration_only,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Empty weekday set means one-shot: the record disables itself after
    /// firing instead of rescheduling.
    pub fn is_repeating(&self) -> bool {
        !self.weekdays.is_empty()
    }
}

pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

pub fn clamp_label(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_LEN {
        return label.to_string();
    }
    label.chars().take(MAX_LABEL_LEN).collect()
}

pub(crate) fn normalize_weekdays(weekdays: Vec<Weekday>) -> Vec<Weekday> {
    let mut seen = HashSet::new();
    weekdays
        .into_iter()
        .filter(|day| seen.insert(*day))
        .collect()
}

/// Decodes the persisted payload. An unreadable or unversioned payload, or a
/// record that cannot be reconstructed, never raises: the payload degrades to
/// whatever decoded cleanly (an empty list in the worst case).
pub fn decode_alarms(bytes: &[u8]) -> Vec<Alarm> {
    let raw = match serde_json::from_slice::<AlarmsFile>(bytes) {
        Ok(raw) => raw,
        Err(err) => {
            log::warn!("alarm payload unreadable, treating as empty: {err}");
            return Vec::new();
        }
    };
    if raw.version != PAYLOAD_VERSION {
        log::warn!(
            "unsupported alarm payload version {}, treating as empty",
            raw.version
        );
        return Vec::new();
    }

    let mut ids = HashSet::new();
    let mut alarms = Vec::with_capacity(raw.alarms.len());
    for record in raw.alarms {
        if !ids.insert(record.id.clone()) {
            log::warn!(
                "duplicate alarm id {} in payload, dropping record",
                record.id
            );
            continue;
        }
        let time = match parse_local_time(&record.time) {
            Some(time) => time,
            None => {
                log::warn!(
                    "alarm {} has invalid time '{}', dropping record",
                    record.id,
                    record.time
                );
                continue;
            }
        };
        alarms.push(Alarm {
            id: record.id,
            parent_id: record.parent_id,
            time: truncate_to_minute(time),
            enabled: record.enabled,
            weekdays: normalize_weekdays(
                record
                    .weekdays
                    .into_iter()
                    .map(WeekdayToken::to_chrono)
                    .collect(),
            ),
            label: clamp_label(&record.label),
            vibration_only: record.vibration_only,
        });
    }
    alarms
}

pub fn encode_alarms(alarms: &[Alarm]) -> Vec<u8> {
    let mut serialized = Vec::with_capacity(alarms.len());
    for alarm in alarms {
        let mut obj = Map::new();
        obj.insert("id".to_string(), Value::String(alarm.id.clone()));
        if let Some(parent_id) = &alarm.parent_id {
            obj.insert("parent_id".to_string(), Value::String(parent_id.clone()));
        }
        obj.insert(
            "time".to_string(),
            Value::String(alarm.time.format("%H:%M").to_string()),
        );
        obj.insert("enabled".to_string(), Value::Bool(alarm.enabled));
        let days = alarm
            .weekdays
            .iter()
            .map(|day| Value::String(weekday_to_token(*day).to_string()))
            .collect::<Vec<_>>();
        obj.insert("weekdays".to_string(), Value::Array(days));
        obj.insert("label".to_string(), Value::String(alarm.label.clone()));
        obj.insert(
            "vibration_only".to_string(),
            Value::Bool(alarm.vibration_only),
        );
        serialized.push(Value::Object(obj));
    }

    let payload = json!({
        "version": PAYLOAD_VERSION,
        "alarms": serialized,
    });
    let mut text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
        // A pure-data payload cannot fail to serialize; keep the store moving.
        format!("{{\"version\":{PAYLOAD_VERSION},\"alarms\":[]}}")
    });
    text.push('\n');
    text.into_bytes()
}

fn parse_local_time(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S%.f"))
        .ok()
}

#[derive(Debug, Deserialize)]
struct AlarmsFile {
    version: u32,
    #[serde(default)]
    alarms: Vec<AlarmRecordFile>,
}

#[derive(Debug, Deserialize)]
struct AlarmRecordFile {
    id: String,
    #[serde(default)]
    parent_id: Option<String>,
    time: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    weekdays: Vec<WeekdayToken>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    vibration_only: bool,
}

#[derive(Debug, Deserialize)]
enum WeekdayToken {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl WeekdayToken {
    fn to_chrono(self) -> Weekday {
        match self {
            WeekdayToken::Mon => Weekday::Mon,
            WeekdayToken::Tue => Weekday::Tue,
            WeekdayToken::Wed => Weekday::Wed,
            WeekdayToken::Thu => Weekday::Thu,
            WeekdayToken::Fri => Weekday::Fri,
            WeekdayToken::Sat => Weekday::Sat,
            WeekdayToken::Sun => Weekday::Sun,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn weekday_to_token(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}
