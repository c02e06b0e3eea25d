use tokio::sync::watch;

/// A one-shot closable signal used as the cancellation protocol: every
/// long-lived task that holds network resources owns one, and closing it
/// is how callers tell the task to unwind. `close` is idempotent —
/// closing an already-closed beacon is a no-op.
#[derive(Clone)]
pub struct DoneBeacon {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for DoneBeacon {
    fn default() -> Self {
        Self::new()
    }
}

impl DoneBeacon {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Signal cancellation. Safe to call more than once or from more
    /// than one owner of a clone.
    pub fn close(&self) {
        let _ = self.tx.send(true);
    }

    /// Non-blocking poll.
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the beacon is closed. Safe to call from multiple
    /// clones concurrently.
    pub async fn closed(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent_and_wakes_waiters() {
        let beacon = DoneBeacon::new();
        assert!(!beacon.is_closed());
        let waiter = beacon.clone();
        let handle = tokio::spawn(async move {
            waiter.closed().await;
        });
        beacon.close();
        beacon.close();
        handle.await.unwrap();
        assert!(beacon.is_closed());
    }

    #[tokio::test]
    async fn closed_resolves_immediately_if_already_closed() {
        let beacon = DoneBeacon::new();
        beacon.close();
        tokio::time::timeout(std::time::Duration::from_millis(50), beacon.closed())
            .await
            .expect("closed() should not block once already closed");
    }
}
