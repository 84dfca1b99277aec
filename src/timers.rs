use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::platform::{PlatformError, TimerKey, TimerPrecision, WakeTimerService};

// Upper bound on a single condvar wait so the worker re-reads the wall clock
// even when the next registration is far away or the clock jumps.
const MAX_WAIT: Duration = Duration::from_millis(500);

/// In-process [`WakeTimerService`]: a worker thread holds the pending
/// registrations and delivers each fired [`TimerKey`] on an mpsc channel for
/// the host to route into the lifecycle controller. Both precisions fire at
/// their instant here; the distinction exists for platforms where best-effort
/// wakes may be deferred.
pub struct StdWakeTimers {
    inner: Arc<TimerInner>,
    worker: Option<JoinHandle<()>>,
}

struct TimerInner {
    state: Mutex<TimerState>,
    wakeup: Condvar,
    exact_allowed: AtomicBool,
}

struct TimerState {
    registrations: Vec<Registration>,
    stopped: bool,
}

struct Registration {
    key: TimerKey,
    at: DateTime<Local>,
    #[allow(dead_code)]
    precision: TimerPrecision,
}

impl StdWakeTimers {
    pub fn start(exact_allowed: bool) -> (Self, Receiver<TimerKey>) {
        let inner = Arc::new(TimerInner {
            state: Mutex::new(TimerState {
                registrations: Vec::new(),
                stopped: false,
            }),
            wakeup: Condvar::new(),
            exact_allowed: AtomicBool::new(exact_allowed),
        });
        let (fired_tx, fired_rx) = channel();
        let inner_for_worker = Arc::clone(&inner);
        let worker = thread::spawn(move || run_timer_loop(&inner_for_worker, &fired_tx));
        (
            Self {
                inner,
                worker: Some(worker),
            },
            fired_rx,
        )
    }

    /// Models granting or revoking the elevated exact-wake capability.
    pub fn set_exact_allowed(&self, allowed: bool) {
        self.inner.exact_allowed.store(allowed, Ordering::Relaxed);
    }
}

impl WakeTimerService for StdWakeTimers {
    fn register(
        &self,
        key: TimerKey,
        at: DateTime<Local>,
        precision: TimerPrecision,
    ) -> Result<(), PlatformError> {
        let mut state = self.inner.lock_state();
        if state.stopped {
            return Err(PlatformError::Storage(
                "timer service already shut down".to_string(),
            ));
        }
        state.registrations.retain(|entry| entry.key != key);
        state.registrations.push(Registration { key, at, precision });
        self.inner.wakeup.notify_all();
        Ok(())
    }

    fn cancel(&self, key: &TimerKey) {
        let mut state = self.inner.lock_state();
        state.registrations.retain(|entry| &entry.key != key);
        self.inner.wakeup.notify_all();
    }

    fn can_schedule_exact(&self) -> bool {
        self.inner.exact_allowed.load(Ordering::Relaxed)
    }
}

impl Drop for StdWakeTimers {
    fn drop(&mut self) {
        self.inner.lock_state().stopped = true;
        self.inner.wakeup.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl TimerInner {
    fn lock_state(&self) -> MutexGuard<'_, TimerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn run_timer_loop(inner: &TimerInner, fired: &Sender<TimerKey>) {
    let mut state = inner.lock_state();
    loop {
        if state.stopped {
            return;
        }

        let now = Local::now();
        if let Some(due) = state
            .registrations
            .iter()
            .position(|entry| entry.at <= now)
        {
            let registration = state.registrations.remove(due);
            drop(state);
            log::debug!("wake timer fired: {:?}", registration.key);
            if fired.send(registration.key).is_err() {
                // Receiver gone, nobody left to wake.
                return;
            }
            state = inner.lock_state();
            continue;
        }

        let wait = state
            .registrations
            .iter()
            .map(|entry| entry.at - now)
            .min()
            .and_then(|delta| delta.to_std().ok())
            .map(|delta| delta.min(MAX_WAIT))
            .unwrap_or(MAX_WAIT);
        let (guard, _timeout) = inner
            .wakeup
            .wait_timeout(state, wait)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state = guard;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    fn soon(ms: i64) -> DateTime<Local> {
        Local::now() + ChronoDuration::milliseconds(ms)
    }

    #[test]
    fn registered_timer_fires_and_is_delivered() {
        let (timers, fired) = StdWakeTimers::start(true);
        timers
            .register(TimerKey::Main("a1".to_string()), soon(40), TimerPrecision::Exact)
            .expect("register");

        let key = fired.recv_timeout(Duration::from_secs(2)).expect("fired");
        assert_eq!(key, TimerKey::Main("a1".to_string()));
    }

    #[test]
    fn past_instants_fire_immediately() {
        let (timers, fired) = StdWakeTimers::start(true);
        timers
            .register(
                TimerKey::Snooze("late".to_string()),
                soon(-1_000),
                TimerPrecision::BestEffort,
            )
            .expect("register");
        let key = fired.recv_timeout(Duration::from_secs(2)).expect("fired");
        assert_eq!(key, TimerKey::Snooze("late".to_string()));
    }

    #[test]
    fn cancelled_registration_never_fires() {
        let (timers, fired) = StdWakeTimers::start(true);
        let key = TimerKey::Main("gone".to_string());
        timers
            .register(key.clone(), soon(80), TimerPrecision::Exact)
            .expect("register");
        timers.cancel(&key);
        // Cancelling again is a no-op.
        timers.cancel(&key);

        assert!(fired.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn re_registering_a_key_replaces_the_prior_instant() {
        let (timers, fired) = StdWakeTimers::start(true);
        let key = TimerKey::Main("moved".to_string());
        timers
            .register(key.clone(), soon(5_000), TimerPrecision::Exact)
            .expect("register");
        timers
            .register(key.clone(), soon(40), TimerPrecision::Exact)
            .expect("register");

        assert_eq!(
            fired.recv_timeout(Duration::from_secs(2)).expect("fired"),
            key
        );
        // The 5 s registration was replaced, so nothing else arrives.
        assert!(fired.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn earlier_registrations_fire_first() {
        let (timers, fired) = StdWakeTimers::start(true);
        timers
            .register(
                TimerKey::Main("second".to_string()),
                soon(250),
                TimerPrecision::Exact,
            )
            .expect("register");
        timers
            .register(
                TimerKey::Main("first".to_string()),
                soon(40),
                TimerPrecision::Exact,
            )
            .expect("register");

        assert_eq!(
            fired.recv_timeout(Duration::from_secs(2)).expect("fired"),
            TimerKey::Main("first".to_string())
        );
        assert_eq!(
            fired.recv_timeout(Duration::from_secs(2)).expect("fired"),
            TimerKey::Main("second".to_string())
        );
    }

    #[test]
    fn exact_capability_grant_is_observable() {
        let (timers, _fired) = StdWakeTimers::start(false);
        assert!(!timers.can_schedule_exact());
        timers.set_exact_allowed(true);
        assert!(timers.can_schedule_exact());
    }
}
