use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::beacon::DoneBeacon;

/// A scoped background worker that runs a supplied function every
/// `interval` until closed. `close` cooperates with an in-flight cycle:
/// if the task is mid-cycle when `close` is called, `close` waits for
/// that cycle to finish before returning.
pub struct PeriodicTask {
    beacon: DoneBeacon,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let beacon = DoneBeacon::new();
        let loop_beacon = beacon.clone();
        let handle = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = loop_beacon.closed() => break,
                        _ = ticker.tick() => {
                            f().await;
                        }
                    }
                }
            }
            .instrument(tracing::info_span!("periodic_task", name)),
        );
        Self {
            beacon,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn beacon(&self) -> DoneBeacon {
        self.beacon.clone()
    }

    /// Stop the loop and wait for any in-flight cycle to complete.
    pub async fn close(&self) {
        self.beacon.close();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_on_every_tick_until_closed() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn("test", Duration::from_millis(5), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        task.close().await;
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected multiple cycles, saw {seen}");
        let after_close = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(after_close, count.load(Ordering::SeqCst));
    }
}
