use std::time::Duration;

/// A snapshot of one outbound's eligibility and recent performance, as
/// seen by a balancing strategy. Strategies never reach into the
/// observatory or metrics registries directly — the caller (the
/// dispatcher) assembles this list fresh on every pick.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub tag: String,
    pub alive: bool,
    pub delay: Option<Duration>,
    /// Recent throughput in bytes/sec, if the metrics registry has one.
    pub throughput: Option<f64>,
}

impl Candidate {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            alive: true,
            delay: None,
            throughput: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_throughput(mut self, throughput: f64) -> Self {
        self.throughput = Some(throughput);
        self
    }

    pub fn dead(mut self) -> Self {
        self.alive = false;
        self
    }
}
