use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::periodic::PeriodicTask;

/// Fires a supplied cancellation once no [`bump`](ActivityTimer::bump)
/// call has been observed for `idle` time. Any read/write on the
/// connection the timer guards should call `bump`.
pub struct ActivityTimer {
    last_activity: Arc<Mutex<Instant>>,
    fired: Arc<AtomicBool>,
    _task: PeriodicTask,
}

impl ActivityTimer {
    pub fn start<F>(idle: Duration, on_timeout: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let last_activity = Arc::new(Mutex::new(Instant::now()));
        let fired = Arc::new(AtomicBool::new(false));

        let poll_every = (idle / 4).max(Duration::from_millis(25));
        let last = last_activity.clone();
        let fired_flag = fired.clone();
        let on_timeout = std::sync::Arc::new(on_timeout);
        let task = PeriodicTask::spawn("activity_timer", poll_every, move || {
            let last = last.clone();
            let fired_flag = fired_flag.clone();
            let on_timeout = on_timeout.clone();
            let idle = idle;
            async move {
                if fired_flag.load(Ordering::Acquire) {
                    return;
                }
                let elapsed = last.lock().elapsed();
                if elapsed >= idle {
                    fired_flag.store(true, Ordering::Release);
                    on_timeout();
                }
            }
        });

        Self {
            last_activity,
            fired,
            _task: task,
        }
    }

    pub fn bump(&self) {
        if self.fired.load(Ordering::Acquire) {
            return;
        }
        *self.last_activity.lock() = Instant::now();
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
