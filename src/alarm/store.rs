use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use crate::alarm::model::{Alarm, decode_alarms, encode_alarms};
use crate::platform::{DurableStore, PlatformError};

/// Storage key for the alarm list payload.
pub const ALARMS_KEY: &str = "alarms";

/// Durable alarm list with change notifications. All saves replace the whole
/// list atomically; subscribers receive the latest snapshot immediately and a
/// fresh copy after every subsequent change.
#[derive(Clone)]
pub struct AlarmStore {
    backend: Arc<dyn DurableStore>,
    subscribers: Arc<Mutex<Vec<Sender<Vec<Alarm>>>>>,
}

impl AlarmStore {
    pub fn new(backend: Arc<dyn DurableStore>) -> Self {
        Self {
            backend,
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Current snapshot. Absent, unreadable, or corrupt payloads decode to an
    /// empty list; this never raises to callers.
    pub fn load(&self) -> Vec<Alarm> {
        match self.backend.get(ALARMS_KEY) {
            Ok(Some(bytes)) => decode_alarms(&bytes),
            Ok(None) => Vec::new(),
            Err(err) => {
                log::warn!("alarm payload unreadable, treating as empty: {err}");
                Vec::new()
            }
        }
    }

    pub fn save(&self, alarms: &[Alarm]) -> Result<(), PlatformError> {
        self.backend.set(ALARMS_KEY, &encode_alarms(alarms))?;
        self.notify(alarms);
        Ok(())
    }

    /// Stream of list snapshots. The latest snapshot is delivered before this
    /// returns; disconnected receivers are pruned on the next notification.
    pub fn subscribe(&self) -> Receiver<Vec<Alarm>> {
        let (tx, rx) = channel();
        let _ = tx.send(self.load());
        self.lock_subscribers().push(tx);
        rx
    }

    /// Flips `enabled` for one id directly against the durable payload, for
    /// the firing path that runs without an in-memory snapshot. No-op when
    /// the id is absent or the payload is unreadable.
    pub fn set_enabled_by_id(&self, id: &str, enabled: bool) {
        let bytes = match self.backend.get(ALARMS_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(err) => {
                log::warn!("skipping enabled update for {id}: {err}");
                return;
            }
        };
        let mut alarms = decode_alarms(&bytes);
        let mut found = false;
        for alarm in &mut alarms {
            if alarm.id == id {
                alarm.enabled = enabled;
                found = true;
            }
        }
        if !found {
            return;
        }
        match self.backend.set(ALARMS_KEY, &encode_alarms(&alarms)) {
            Ok(()) => self.notify(&alarms),
            Err(err) => log::error!("failed to persist enabled update for {id}: {err}"),
        }
    }

    fn notify(&self, alarms: &[Alarm]) {
        self.lock_subscribers()
            .retain(|subscriber| subscriber.send(alarms.to_vec()).is_ok());
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Sender<Vec<Alarm>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
