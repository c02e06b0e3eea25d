use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use junction_task::PeriodicTask;

/// Cone mode decides the NAT key: full-cone keys on the client address
/// alone (any remote can reach the mapping once it exists), while
/// symmetric mode keys on `(client, target)` so each destination gets an
/// independent mapping, matching real NAT hardware's two common modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct NatKey {
    client: SocketAddr,
    target: Option<SocketAddr>,
}

struct NatEntry<V> {
    value: V,
    last_seen: Instant,
}

struct Inner<V> {
    cone: bool,
    entries: Mutex<HashMap<NatKey, NatEntry<V>>>,
}

/// A UDP NAT table mapping a client (and, in symmetric mode, its target)
/// to an arbitrary session handle `V`, with periodic idle eviction.
pub struct NatTable<V> {
    inner: Arc<Inner<V>>,
    task: Mutex<Option<PeriodicTask>>,
}

impl<V: Clone + Send + Sync + 'static> NatTable<V> {
    pub fn new(cone: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                cone,
                entries: Mutex::new(HashMap::new()),
            }),
            task: Mutex::new(None),
        }
    }

    fn key(&self, client: SocketAddr, target: SocketAddr) -> NatKey {
        NatKey {
            client,
            target: if self.inner.cone { None } else { Some(target) },
        }
    }

    /// Returns the existing session for `client`/`target`, bumping its
    /// last-seen time, or creates one via `make` if none exists yet.
    pub fn get_or_create(&self, client: SocketAddr, target: SocketAddr, make: impl FnOnce() -> V) -> (V, bool) {
        let key = self.key(client, target);
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.last_seen = Instant::now();
            return (entry.value.clone(), false);
        }
        let value = make();
        entries.insert(
            key,
            NatEntry {
                value: value.clone(),
                last_seen: Instant::now(),
            },
        );
        (value, true)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops mappings idle longer than `idle_timeout`.
    pub fn sweep(&self, idle_timeout: Duration) {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .retain(|_, entry| now.duration_since(entry.last_seen) < idle_timeout);
    }

    /// Starts a background sweeper on `check_interval`, evicting entries
    /// idle past `idle_timeout` (the spec's 60s check / 120s idle
    /// cadence, left as parameters so tests can use a smaller window).
    pub fn start_cleanup(self: &Arc<Self>, check_interval: Duration, idle_timeout: Duration) {
        let inner = self.inner.clone();
        let task = PeriodicTask::spawn("udp_nat.cleanup", check_interval, move || {
            let inner = inner.clone();
            async move {
                let now = Instant::now();
                inner
                    .entries
                    .lock()
                    .retain(|_, entry| now.duration_since(entry.last_seen) < idle_timeout);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn cone_mode_reuses_mapping_across_targets() {
        let nat: NatTable<u32> = NatTable::new(true);
        let (v1, created1) = nat.get_or_create(addr(1), addr(100), || 42);
        let (v2, created2) = nat.get_or_create(addr(1), addr(200), || 99);
        assert!(created1);
        assert!(!created2);
        assert_eq!(v1, v2);
        assert_eq!(nat.len(), 1);
    }

    #[test]
    fn symmetric_mode_keys_on_target_too() {
        let nat: NatTable<u32> = NatTable::new(false);
        nat.get_or_create(addr(1), addr(100), || 1);
        nat.get_or_create(addr(1), addr(200), || 2);
        assert_eq!(nat.len(), 2);
    }

    #[test]
    fn sweep_drops_only_idle_entries() {
        let nat: NatTable<u32> = NatTable::new(true);
        nat.get_or_create(addr(1), addr(100), || 1);
        std::thread::sleep(Duration::from_millis(20));
        nat.sweep(Duration::from_millis(5));
        assert!(nat.is_empty());
    }
}
