use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{instrument, warn};

use junction_task::PeriodicTask;

use crate::prober::Prober;
use crate::status::ObservationStatus;

/// Whether a probing round dials every subject at once or one at a time.
/// Serialized probing is gentler on a congested link; parallel probing
/// finishes a full round faster when subjects are numerous.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeMode {
    Serialized,
    Parallel,
}

/// Probes a set of outbound tags on an interval and keeps a status table
/// of the results. Subjects are resolved from a selector (here: a flat
/// tag list — the site/geo dataset that would expand a richer selector
/// into tags stays out of scope, as in the router's `IpMatcher`).
pub struct Observatory {
    subjects: Mutex<Vec<String>>,
    status: Arc<Mutex<HashMap<String, ObservationStatus>>>,
    prober: Arc<dyn Prober>,
    mode: ProbeMode,
    task: Mutex<Option<PeriodicTask>>,
}

impl Observatory {
    pub fn new(prober: Arc<dyn Prober>, mode: ProbeMode) -> Self {
        Self {
            subjects: Mutex::new(Vec::new()),
            status: Arc::new(Mutex::new(HashMap::new())),
            prober,
            mode,
            task: Mutex::new(None),
        }
    }

    pub fn set_subjects(&self, tags: Vec<String>) {
        *self.subjects.lock() = tags;
    }

    pub fn add_subject(&self, tag: impl Into<String>) {
        let tag = tag.into();
        let mut subjects = self.subjects.lock();
        if !subjects.contains(&tag) {
            subjects.push(tag);
        }
    }

    pub fn remove_subject(&self, tag: &str) {
        self.subjects.lock().retain(|t| t != tag);
        self.status.lock().remove(tag);
    }

    pub fn get_observation(&self, tag: &str) -> Option<ObservationStatus> {
        self.status.lock().get(tag).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, ObservationStatus> {
        self.status.lock().clone()
    }

    /// Runs one probing round immediately, outside the periodic schedule
    /// — useful for tests and for an operator-triggered re-check.
    #[instrument(skip(self), name = "observatory.round")]
    pub async fn run_once(&self) {
        let subjects = self.subjects.lock().clone();
        match self.mode {
            ProbeMode::Serialized => {
                for tag in subjects {
                    self.probe_one(tag).await;
                }
            }
            ProbeMode::Parallel => {
                let mut handles = Vec::with_capacity(subjects.len());
                for tag in subjects {
                    let prober = self.prober.clone();
                    let status = self.status.clone();
                    handles.push(tokio::spawn(async move {
                        probe_and_record(prober, status, tag).await;
                    }));
                }
                for handle in handles {
                    let _ = handle.await;
                }
            }
        }
    }

    async fn probe_one(&self, tag: String) {
        probe_and_record(self.prober.clone(), self.status.clone(), tag).await;
    }

    /// Starts the periodic background round. Dropping the returned
    /// handle is not enough to stop it — call `close` or let the
    /// `Observatory` itself drop, which drops the task and its beacon.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let this = self.clone();
        let task = PeriodicTask::spawn("observatory.probe", interval, move || {
            let this = this.clone();
            async move {
                this.run_once().await;
            }
        });
        *self.task.lock() = Some(task);
    }

    pub async fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.close().await;
        }
    }
}

async fn probe_and_record(prober: Arc<dyn Prober>, status: Arc<Mutex<HashMap<String, ObservationStatus>>>, tag: String) {
    let now = Instant::now();
    let mut entry = status.lock().remove(&tag).unwrap_or_default();
    match prober.probe(&tag).await {
        Ok(delay) => entry.record_success(delay, now),
        Err(e) => {
            warn!(outbound = %tag, error = %e, "probe failed");
            entry.record_failure(e.to_string(), now);
        }
    }
    status.lock().insert(tag, entry);
}
