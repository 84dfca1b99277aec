use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Local, NaiveTime, Timelike};

use crate::alarm::scheduler::AlarmScheduler;
use crate::alarm::store::AlarmStore;
use crate::platform::{
    AlarmNotification, AudioHandle, AudioSurface, NotificationAction, NotificationSurface,
    TimerKey, TimerPrecision, VibrationHandle, VibrationSurface, WakeTimerService,
};

pub const SNOOZE_MINUTES: i64 = 5;
pub const AUTO_STOP_MINUTES: i64 = 3;
pub const FADE_IN_MS: u64 = 30_000;
pub const FADE_IN_STEPS: u32 = 60;
/// Off/on vibration segments, repeated while ringing.
pub const VIBRATION_PATTERN_MS: [u64; 3] = [0, 1000, 500];

const DEFAULT_TITLE: &str = "Alarm";
const NOTIFICATION_BODY: &str = "Tap to stop the alarm";

/// The process-wide "currently ringing" slot. The host owns exactly one of
/// these and injects it into the lifecycle controller; keeping it explicit
/// instead of a global makes the lifecycle deterministic under test. At most
/// one alarm occupies the slot; a newer trigger evicts the older one.
#[derive(Clone, Default)]
pub struct RingingState {
    current: Arc<Mutex<Option<RingingContext>>>,
}

impl RingingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ringing_alarm(&self) -> Option<String> {
        self.lock().as_ref().map(|ctx| ctx.alarm_id.clone())
    }

    pub fn is_idle(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<RingingContext>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct RingingContext {
    alarm_id: String,
    notification_id: i32,
    audio: Option<AudioHandle>,
    vibration: Option<VibrationHandle>,
    fade: Option<FadeTask>,
}

/// Drives an alarm from trigger to dismissal: alert side effects, snooze,
/// and the auto-stop deadline. Trigger, stop, and snooze events arrive from
/// the platform at-least-once and possibly duplicated, so every entry point
/// serializes on the ringing slot and is idempotent.
pub struct AlarmLifecycleController {
    store: AlarmStore,
    scheduler: AlarmScheduler,
    timers: Arc<dyn WakeTimerService>,
    notifications: Arc<dyn NotificationSurface>,
    audio: Arc<dyn AudioSurface>,
    vibration: Arc<dyn VibrationSurface>,
    ringing: RingingState,
}

impl AlarmLifecycleController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: AlarmStore,
        scheduler: AlarmScheduler,
        timers: Arc<dyn WakeTimerService>,
        notifications: Arc<dyn NotificationSurface>,
        audio: Arc<dyn AudioSurface>,
        vibration: Arc<dyn VibrationSurface>,
        ringing: RingingState,
    ) -> Self {
        Self {
            store,
            scheduler,
            timers,
            notifications,
            audio,
            vibration,
            ringing,
        }
    }

    pub fn ringing(&self) -> &RingingState {
        &self.ringing
    }

    pub fn on_trigger(&self, alarm_id: &str) {
        self.on_trigger_at(alarm_id, Local::now());
    }

    pub fn on_trigger_at(&self, alarm_id: &str, now: DateTime<Local>) {
        let mut slot = self.ringing.lock();
        log::debug!("alarm {alarm_id} triggered");

        // Last trigger wins: silence whatever is ringing before starting.
        if let Some(previous) = slot.take() {
            log::debug!(
                "silencing alarm {} for incoming trigger {alarm_id}",
                previous.alarm_id
            );
            self.silence(previous);
        }
        self.timers.cancel(&TimerKey::AutoStop);

        // Vibration starts immediately, before any lookup can fail.
        let vibration = match self.vibration.vibrate(&VIBRATION_PATTERN_MS, true) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::warn!("failed to start vibration for alarm {alarm_id}: {err}");
                None
            }
        };

        let record = self
            .store
            .load()
            .into_iter()
            .find(|alarm| alarm.id == alarm_id);
        if record.is_none() {
            log::warn!("alarm {alarm_id} missing at trigger time, ringing with defaults");
        }
        let vibration_only = record.as_ref().map(|a| a.vibration_only).unwrap_or(false);
        let label = record.as_ref().map(|a| a.label.clone()).unwrap_or_default();
        let notification_id = record
            .as_ref()
            .map(|a| notification_id_for(a.time))
            .unwrap_or_else(|| fallback_notification_id(alarm_id));

        let (audio, fade) = if vibration_only {
            (None, None)
        } else {
            self.start_audio(alarm_id)
        };

        let notification = AlarmNotification {
            title: if label.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                label
            },
            body: NOTIFICATION_BODY.to_string(),
            actions: [NotificationAction::Stop, NotificationAction::Snooze],
            full_screen: true,
            dismissable: false,
        };
        if let Err(err) = self.notifications.show(notification_id, &notification) {
            log::warn!("failed to show ringing notification for alarm {alarm_id}: {err}");
        }

        let deadline = now + Duration::minutes(AUTO_STOP_MINUTES);
        if let Err(err) = self
            .timers
            .register(TimerKey::AutoStop, deadline, self.wake_precision())
        {
            log::warn!("failed to arm auto-stop for alarm {alarm_id}: {err}");
        }

        // Runs even when the alerts above failed, so this occurrence can
        // never fire a second time.
        match &record {
            Some(alarm) if alarm.is_repeating() => {
                self.scheduler
                    .schedule_alarm_at(&alarm.id, alarm.time, &alarm.weekdays, now);
            }
            _ => {
                // One-shot (or deleted concurrently): the id leaves the
                // scheduled state and the record disables itself.
                self.scheduler.cancel_alarm(alarm_id);
                self.store.set_enabled_by_id(alarm_id, false);
            }
        }

        *slot = Some(RingingContext {
            alarm_id: alarm_id.to_string(),
            notification_id,
            audio,
            vibration,
            fade,
        });
    }

    /// Idempotent teardown: silences alerts, disarms the auto-stop deadline,
    /// dismisses the notification, and returns the slot to idle. Safe with
    /// nothing ringing and safe under duplicate delivery.
    pub fn on_stop(&self, alarm_id: &str, notification_id: Option<i32>) {
        let mut slot = self.ringing.lock();
        let previous = slot.take();
        let last_known = previous.as_ref().map(|ctx| ctx.notification_id);
        if let Some(ctx) = previous {
            self.silence(ctx);
        }
        self.timers.cancel(&TimerKey::AutoStop);
        let to_cancel = notification_id
            .or(last_known)
            .unwrap_or_else(|| fallback_notification_id(alarm_id));
        self.notifications.cancel(to_cancel);
        log::debug!("alarm {alarm_id} stopped");
    }

    /// Same teardown as [`Self::on_stop`], then a snooze timer for the same
    /// id. The snooze fires back into `on_trigger` without touching the
    /// persisted `weekdays` or `enabled`.
    pub fn on_snooze(&self, alarm_id: &str, notification_id: Option<i32>) {
        self.on_snooze_at(alarm_id, notification_id, Local::now());
    }

    pub fn on_snooze_at(
        &self,
        alarm_id: &str,
        notification_id: Option<i32>,
        now: DateTime<Local>,
    ) {
        self.on_stop(alarm_id, notification_id);
        self.scheduler
            .schedule_snooze_at(alarm_id, SNOOZE_MINUTES, now);
        log::debug!("alarm {alarm_id} snoozed for {SNOOZE_MINUTES} minutes");
    }

    /// Fired by the platform when the auto-stop deadline passes without an
    /// explicit stop; performs the same teardown for whatever is ringing.
    pub fn on_auto_stop(&self) {
        let mut slot = self.ringing.lock();
        let Some(ctx) = slot.take() else {
            self.timers.cancel(&TimerKey::AutoStop);
            return;
        };
        log::info!(
            "alarm {} auto-stopped after {AUTO_STOP_MINUTES} minutes",
            ctx.alarm_id
        );
        self.silence(ctx);
        self.timers.cancel(&TimerKey::AutoStop);
    }

    fn start_audio(&self, alarm_id: &str) -> (Option<AudioHandle>, Option<FadeTask>) {
        match self.audio.play_loop() {
            Ok(handle) => {
                if let Err(err) = self.audio.set_volume(handle, 0.0) {
                    log::warn!("failed to zero alarm volume: {err}");
                }
                let fade = FadeTask::spawn(Arc::clone(&self.audio), handle);
                (Some(handle), Some(fade))
            }
            Err(err) => {
                log::warn!(
                    "failed to start audio for alarm {alarm_id}, ringing with vibration only: {err}"
                );
                (None, None)
            }
        }
    }

    /// Releases every alert resource held by a ringing context. Teardown
    /// failures are logged and swallowed; the slot still returns to idle.
    fn silence(&self, ctx: RingingContext) {
        if let Some(fade) = ctx.fade {
            fade.cancel();
        }
        if let Some(handle) = ctx.audio
            && let Err(err) = self.audio.stop(handle)
        {
            log::warn!("failed to stop alarm audio: {err}");
        }
        if let Some(handle) = ctx.vibration
            && let Err(err) = self.vibration.stop(handle)
        {
            log::warn!("failed to stop vibration: {err}");
        }
        self.notifications.cancel(ctx.notification_id);
    }

    fn wake_precision(&self) -> TimerPrecision {
        if self.timers.can_schedule_exact() {
            TimerPrecision::Exact
        } else {
            TimerPrecision::BestEffort
        }
    }
}

/// Cancellable volume ramp 0..=1 over [`FADE_IN_MS`], tied 1:1 to the active
/// ringing context. The worker checks the cancellation channel before every
/// volume write and instead of a plain sleep, so a stop never waits out a
/// fade step. A released audio handle also ends the ramp.
struct FadeTask {
    cancel: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl FadeTask {
    fn spawn(audio: Arc<dyn AudioSurface>, handle: AudioHandle) -> Self {
        let (cancel, cancelled) = channel();
        let worker = thread::spawn(move || run_fade(audio.as_ref(), handle, &cancelled));
        Self {
            cancel,
            worker: Some(worker),
        }
    }

    fn cancel(mut self) {
        let _ = self.cancel.send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_fade(audio: &dyn AudioSurface, handle: AudioHandle, cancelled: &Receiver<()>) {
    let step_delay = StdDuration::from_millis(FADE_IN_MS / u64::from(FADE_IN_STEPS));
    for step in 1..=FADE_IN_STEPS {
        match cancelled.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => return,
        }
        let volume = step as f32 / FADE_IN_STEPS as f32;
        if audio.set_volume(handle, volume).is_err() {
            // Handle released by a concurrent stop.
            return;
        }
        match cancelled.recv_timeout(step_delay) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }
    }
}

fn notification_id_for(time: NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

fn fallback_notification_id(alarm_id: &str) -> i32 {
    let mut hasher = DefaultHasher::new();
    alarm_id.hash(&mut hasher);
    (hasher.finish() & 0x7fff_ffff) as i32
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    use chrono::{TimeZone, Weekday};

    use super::*;
    use crate::alarm::model::Alarm;
    use crate::platform::PlatformError;
    use crate::storage::MemoryStore;

    #[derive(Default)]
    struct RecordingNotifications {
        shown: Mutex<Vec<(i32, AlarmNotification)>>,
        cancelled: Mutex<Vec<i32>>,
    }

    impl NotificationSurface for RecordingNotifications {
        fn show(&self, id: i32, notification: &AlarmNotification) -> Result<(), PlatformError> {
            self.shown
                .lock()
                .expect("lock")
                .push((id, notification.clone()));
            Ok(())
        }

        fn cancel(&self, id: i32) {
            self.cancelled.lock().expect("lock").push(id);
        }
    }

    #[derive(Default)]
    struct RecordingAudio {
        next_handle: AtomicU64,
        playing: Mutex<HashSet<u64>>,
        volume_writes: Mutex<Vec<f32>>,
    }

    impl AudioSurface for RecordingAudio {
        fn play_loop(&self) -> Result<AudioHandle, PlatformError> {
            let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
            self.playing.lock().expect("lock").insert(id);
            Ok(AudioHandle(id))
        }

        fn set_volume(&self, handle: AudioHandle, volume: f32) -> Result<(), PlatformError> {
            if !self.playing.lock().expect("lock").contains(&handle.0) {
                return Err(PlatformError::Alert("handle released".to_string()));
            }
            self.volume_writes.lock().expect("lock").push(volume);
            Ok(())
        }

        fn stop(&self, handle: AudioHandle) -> Result<(), PlatformError> {
            self.playing.lock().expect("lock").remove(&handle.0);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingVibration {
        next_handle: AtomicU64,
        active: Mutex<HashSet<u64>>,
    }

    impl VibrationSurface for RecordingVibration {
        fn vibrate(
            &self,
            _pattern_ms: &[u64],
            _repeat: bool,
        ) -> Result<VibrationHandle, PlatformError> {
            let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
            self.active.lock().expect("lock").insert(id);
            Ok(VibrationHandle(id))
        }

        fn stop(&self, handle: VibrationHandle) -> Result<(), PlatformError> {
            self.active.lock().expect("lock").remove(&handle.0);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTimers {
        registered: Mutex<Vec<(TimerKey, DateTime<Local>)>>,
    }

    impl RecordingTimers {
        fn keys(&self) -> Vec<TimerKey> {
            self.registered
                .lock()
                .expect("lock")
                .iter()
                .map(|(key, _)| key.clone())
                .collect()
        }
    }

    impl WakeTimerService for RecordingTimers {
        fn register(
            &self,
            key: TimerKey,
            at: DateTime<Local>,
            _precision: TimerPrecision,
        ) -> Result<(), PlatformError> {
            let mut registered = self.registered.lock().expect("lock");
            registered.retain(|(existing, _)| existing != &key);
            registered.push((key, at));
            Ok(())
        }

        fn cancel(&self, key: &TimerKey) {
            self.registered
                .lock()
                .expect("lock")
                .retain(|(existing, _)| existing != key);
        }

        fn can_schedule_exact(&self) -> bool {
            true
        }
    }

    struct Fixture {
        controller: AlarmLifecycleController,
        store: AlarmStore,
        scheduler: AlarmScheduler,
        notifications: Arc<RecordingNotifications>,
        audio: Arc<RecordingAudio>,
        vibration: Arc<RecordingVibration>,
        timers: Arc<RecordingTimers>,
    }

    fn fixture() -> Fixture {
        let store = AlarmStore::new(Arc::new(MemoryStore::new()));
        let timers = Arc::new(RecordingTimers::default());
        let scheduler = AlarmScheduler::new(timers.clone());
        let notifications = Arc::new(RecordingNotifications::default());
        let audio = Arc::new(RecordingAudio::default());
        let vibration = Arc::new(RecordingVibration::default());
        let controller = AlarmLifecycleController::new(
            store.clone(),
            scheduler.clone(),
            timers.clone(),
            notifications.clone(),
            audio.clone(),
            vibration.clone(),
            RingingState::new(),
        );
        Fixture {
            controller,
            store,
            scheduler,
            notifications,
            audio,
            vibration,
            timers,
        }
    }

    fn now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 8, 3, 7, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn trigger_of_one_shot_rings_and_disables_persisted_record() {
        let fx = fixture();
        let alarm = Alarm::new_primary(time(7, 0), Vec::new(), "morning");
        fx.store.save(&[alarm.clone()]).expect("seed");

        fx.controller.on_trigger_at(&alarm.id, now());

        assert_eq!(fx.controller.ringing().ringing_alarm(), Some(alarm.id.clone()));
        assert!(!fx.store.load()[0].enabled);
        assert!(!fx.audio.playing.lock().expect("lock").is_empty());
        assert!(!fx.vibration.active.lock().expect("lock").is_empty());

        let shown = fx.notifications.shown.lock().expect("lock").clone();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, 7 * 60);
        assert_eq!(shown[0].1.title, "morning");
        assert_eq!(
            shown[0].1.actions,
            [NotificationAction::Stop, NotificationAction::Snooze]
        );
        assert!(shown[0].1.full_screen);
        assert!(!shown[0].1.dismissable);

        assert!(fx.timers.keys().contains(&TimerKey::AutoStop));
    }

    #[test]
    fn trigger_of_repeating_alarm_keeps_enabled_and_reschedules() {
        let fx = fixture();
        let alarm = Alarm::new_primary(time(7, 0), vec![Weekday::Mon, Weekday::Wed], "");
        fx.store.save(&[alarm.clone()]).expect("seed");

        fx.controller.on_trigger_at(&alarm.id, now());

        assert!(fx.store.load()[0].enabled);
        let next = fx
            .scheduler
            .next_occurrence(&alarm.id)
            .expect("rescheduled");
        assert!(next > now());
        assert!(fx.timers.keys().contains(&TimerKey::Main(alarm.id.clone())));
    }

    #[test]
    fn vibration_only_alarm_skips_audio() {
        let fx = fixture();
        let mut alarm = Alarm::new_primary(time(7, 0), Vec::new(), "silent");
        alarm.vibration_only = true;
        fx.store.save(&[alarm.clone()]).expect("seed");

        fx.controller.on_trigger_at(&alarm.id, now());

        assert!(fx.audio.playing.lock().expect("lock").is_empty());
        assert!(!fx.vibration.active.lock().expect("lock").is_empty());
        assert_eq!(fx.controller.ringing().ringing_alarm(), Some(alarm.id));
    }

    #[test]
    fn missing_record_rings_with_default_label_and_audio() {
        let fx = fixture();

        fx.controller.on_trigger_at("ghost", now());

        let shown = fx.notifications.shown.lock().expect("lock").clone();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].1.title, "Alarm");
        assert!(!fx.audio.playing.lock().expect("lock").is_empty());
        assert_eq!(fx.controller.ringing().ringing_alarm(), Some("ghost".to_string()));
        assert!(fx.store.load().is_empty());
    }

    #[test]
    fn stop_tears_down_everything_and_is_idempotent() {
        let fx = fixture();
        let alarm = Alarm::new_primary(time(7, 0), Vec::new(), "wake");
        fx.store.save(&[alarm.clone()]).expect("seed");
        fx.controller.on_trigger_at(&alarm.id, now());

        fx.controller.on_stop(&alarm.id, None);

        assert!(fx.controller.ringing().is_idle());
        assert!(fx.audio.playing.lock().expect("lock").is_empty());
        assert!(fx.vibration.active.lock().expect("lock").is_empty());
        assert!(!fx.timers.keys().contains(&TimerKey::AutoStop));
        assert!(fx
            .notifications
            .cancelled
            .lock()
            .expect("lock")
            .contains(&(7 * 60)));

        // Redelivered stop: same end state, no panic.
        fx.controller.on_stop(&alarm.id, None);
        assert!(fx.controller.ringing().is_idle());
        assert!(fx.audio.playing.lock().expect("lock").is_empty());
    }

    #[test]
    fn stop_with_nothing_ringing_is_safe() {
        let fx = fixture();
        fx.controller.on_stop("never-rang", Some(42));
        assert!(fx.controller.ringing().is_idle());
        assert!(fx
            .notifications
            .cancelled
            .lock()
            .expect("lock")
            .contains(&42));
    }

    #[test]
    fn snooze_tears_down_and_registers_snooze_timer() {
        let fx = fixture();
        let alarm = Alarm::new_primary(time(7, 0), vec![Weekday::Mon], "nap");
        fx.store.save(&[alarm.clone()]).expect("seed");
        fx.controller.on_trigger_at(&alarm.id, now());

        fx.controller.on_snooze_at(&alarm.id, None, now());

        assert!(fx.controller.ringing().is_idle());
        assert!(fx.audio.playing.lock().expect("lock").is_empty());
        let registered = fx.timers.registered.lock().expect("lock").clone();
        let snooze = registered
            .iter()
            .find(|(key, _)| key == &TimerKey::Snooze(alarm.id.clone()))
            .expect("snooze registration");
        assert_eq!(snooze.1, now() + Duration::minutes(SNOOZE_MINUTES));
        // Snooze never rewrites the persisted schedule.
        let persisted = &fx.store.load()[0];
        assert!(persisted.enabled);
        assert_eq!(persisted.weekdays, vec![Weekday::Mon]);
    }

    #[test]
    fn newer_trigger_evicts_the_ringing_alarm() {
        let fx = fixture();
        let first = Alarm::new_primary(time(7, 0), Vec::new(), "first");
        let second = Alarm::new_primary(time(7, 30), Vec::new(), "second");
        fx.store
            .save(&[first.clone(), second.clone()])
            .expect("seed");

        fx.controller.on_trigger_at(&first.id, now());
        let first_audio = fx.audio.playing.lock().expect("lock").clone();
        fx.controller.on_trigger_at(&second.id, now());

        assert_eq!(fx.controller.ringing().ringing_alarm(), Some(second.id));
        let playing = fx.audio.playing.lock().expect("lock").clone();
        assert_eq!(playing.len(), 1);
        assert!(playing.is_disjoint(&first_audio));
        assert!(fx
            .notifications
            .cancelled
            .lock()
            .expect("lock")
            .contains(&(7 * 60)));
    }

    #[test]
    fn auto_stop_performs_a_full_stop() {
        let fx = fixture();
        let alarm = Alarm::new_primary(time(7, 0), Vec::new(), "deadline");
        fx.store.save(&[alarm.clone()]).expect("seed");
        fx.controller.on_trigger_at(&alarm.id, now());

        fx.controller.on_auto_stop();

        assert!(fx.controller.ringing().is_idle());
        assert!(fx.audio.playing.lock().expect("lock").is_empty());
        assert!(fx.vibration.active.lock().expect("lock").is_empty());
        assert!(!fx.timers.keys().contains(&TimerKey::AutoStop));

        // Redelivery after the slot is already idle.
        fx.controller.on_auto_stop();
        assert!(fx.controller.ringing().is_idle());
    }

    #[test]
    fn duplicate_trigger_of_a_one_shot_stays_disabled() {
        let fx = fixture();
        let alarm = Alarm::new_primary(time(7, 0), Vec::new(), "dup");
        fx.store.save(&[alarm.clone()]).expect("seed");

        fx.controller.on_trigger_at(&alarm.id, now());
        fx.controller.on_trigger_at(&alarm.id, now());

        assert!(!fx.store.load()[0].enabled);
        assert_eq!(fx.controller.ringing().ringing_alarm(), Some(alarm.id));
        assert_eq!(fx.audio.playing.lock().expect("lock").len(), 1);
    }

    #[test]
    fn fade_cancellation_stops_the_ramp_promptly() {
        let audio = Arc::new(RecordingAudio::default());
        let handle = audio.play_loop().expect("play");
        let fade = FadeTask::spawn(audio.clone(), handle);

        thread::sleep(StdDuration::from_millis(50));
        fade.cancel();

        let writes = audio.volume_writes.lock().expect("lock").clone();
        assert!(writes.len() <= 1, "ramp kept running: {writes:?}");
        if let Some(first) = writes.first() {
            assert!((first - 1.0 / FADE_IN_STEPS as f32).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn fade_ends_once_the_handle_is_released() {
        let audio = Arc::new(RecordingAudio::default());
        let handle = audio.play_loop().expect("play");
        audio.stop(handle).expect("stop");

        let (_cancel, cancelled) = channel();
        // Runs on the caller thread: returns immediately because every
        // volume write fails on the released handle.
        run_fade(audio.as_ref(), handle, &cancelled);
        assert!(audio.volume_writes.lock().expect("lock").is_empty());
    }
}
