use std::time::{Duration, Instant};

/// Everything known about one outbound's health.
#[derive(Clone, Debug, Default)]
pub struct ObservationStatus {
    pub alive: bool,
    pub delay: Option<Duration>,
    pub last_try: Option<Instant>,
    pub last_seen_alive: Option<Instant>,
    pub last_error: Option<String>,
}

impl ObservationStatus {
    pub fn record_success(&mut self, delay: Duration, now: Instant) {
        self.alive = true;
        self.delay = Some(delay);
        self.last_try = Some(now);
        self.last_seen_alive = Some(now);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: String, now: Instant) {
        self.alive = false;
        self.last_try = Some(now);
        self.last_error = Some(error);
    }
}
