use chrono::{DateTime, Local};
use thiserror::Error;

/// Errors crossing the platform boundary. Persistence and alert failures are
/// degraded or swallowed by the callers per the component contracts; nothing
/// here aborts the alarm lifecycle.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("exact wake scheduling denied")]
    SchedulingDenied,
    #[error("storage backend failure: {0}")]
    Storage(String),
    #[error("alert surface failure: {0}")]
    Alert(String),
}

/// Key-value durable storage. Payloads are opaque bytes; decoding and the
/// corrupt-payload policy live in the alarm store.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), PlatformError>;
}

/// Identifies a single platform timer registration. Registering a key again
/// replaces the previous registration for that key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// The recurring/one-shot registration for an alarm id.
    Main(String),
    /// A pending snooze for an alarm id, independent of its main registration.
    Snooze(String),
    /// The single global auto-stop slot for the ringing alarm.
    AutoStop,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimerPrecision {
    Exact,
    BestEffort,
}

/// Platform wake timer service. Callbacks are delivered at-least-once by the
/// host; everything reacting to them must stay idempotent.
pub trait WakeTimerService: Send + Sync {
    fn register(
        &self,
        key: TimerKey,
        at: DateTime<Local>,
        precision: TimerPrecision,
    ) -> Result<(), PlatformError>;

    /// Idempotent: cancelling an absent registration is a no-op.
    fn cancel(&self, key: &TimerKey);

    /// Whether the elevated exact-wake capability is currently granted.
    fn can_schedule_exact(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Stop,
    Snooze,
}

/// Content of the ringing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmNotification {
    pub title: String,
    pub body: String,
    pub actions: [NotificationAction; 2],
    /// High-priority full-screen presentation on a dedicated stop surface.
    pub full_screen: bool,
    /// The ringing notification cannot be swiped away.
    pub dismissable: bool,
}

pub trait NotificationSurface: Send + Sync {
    fn show(&self, id: i32, notification: &AlarmNotification) -> Result<(), PlatformError>;

    /// Idempotent: cancelling an unknown notification id is a no-op.
    fn cancel(&self, id: i32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VibrationHandle(pub u64);

/// Looping alarm audio. `play_loop` starts playback; volume is set explicitly
/// afterwards. `set_volume` must fail once the handle has been released so a
/// stale fade task stops touching it.
pub trait AudioSurface: Send + Sync {
    fn play_loop(&self) -> Result<AudioHandle, PlatformError>;
    fn set_volume(&self, handle: AudioHandle, volume: f32) -> Result<(), PlatformError>;
    fn stop(&self, handle: AudioHandle) -> Result<(), PlatformError>;
}

pub trait VibrationSurface: Send + Sync {
    /// `pattern_ms` alternates off/on durations starting with an off segment.
    fn vibrate(&self, pattern_ms: &[u64], repeat: bool) -> Result<VibrationHandle, PlatformError>;
    fn stop(&self, handle: VibrationHandle) -> Result<(), PlatformError>;
}
