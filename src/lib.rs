//! Personal alarm core.
//!
//! Alarm records live in a flat list of primaries and their secondaries,
//! persisted through a key-value [`platform::DurableStore`]. The
//! [`alarm::repository::AlarmRepository`] applies cascade-aware mutations and
//! keeps timer registrations in step, the
//! [`alarm::scheduler::AlarmScheduler`] maps each alarm to a platform wake
//! registration, and the [`alarm::lifecycle::AlarmLifecycleController`] runs
//! the fire-to-dismissal path: vibration, fade-in audio, the ringing
//! notification, snooze, and the auto-stop deadline.
//!
//! Rendering, permission prompts, and the OS notification/sound channels are
//! external collaborators: they call the mutation API, subscribe to the alarm
//! stream, and route platform timer callbacks back into the lifecycle
//! controller.

pub mod alarm;
pub mod platform;
pub mod storage;
pub mod timers;

pub use alarm::lifecycle::{AlarmLifecycleController, RingingState};
pub use alarm::model::Alarm;
pub use alarm::repository::AlarmRepository;
pub use alarm::scheduler::AlarmScheduler;
pub use alarm::store::AlarmStore;
pub use alarm::trigger::next_trigger;
pub use alarm::undo::UndoBuffer;
pub use platform::{
    AlarmNotification, AudioHandle, AudioSurface, DurableStore, NotificationAction,
    NotificationSurface, PlatformError, TimerKey, TimerPrecision, VibrationHandle,
    VibrationSurface, WakeTimerService,
};
pub use storage::{FileStore, MemoryStore};
pub use timers::StdWakeTimers;
