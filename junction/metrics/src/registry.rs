use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::counter::Counter;

/// Per-flow traffic counters, attached to a link's reader/writer when
/// the owning inbound handler is tagged and stats are enabled.
#[derive(Debug, Default)]
pub struct LinkMetrics {
    pub uplink: Counter,
    pub downlink: Counter,
    last_update: Mutex<Option<Instant>>,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self) {
        *self.last_update.lock() = Some(Instant::now());
    }

    fn last_update(&self) -> Option<Instant> {
        *self.last_update.lock()
    }
}

/// A registry of per-key metrics that retains entries only while they
/// are either still referenced elsewhere (strong count > 1) or have
/// been touched more recently than `retain_idle`.
pub struct Registry<K: Hash + Eq> {
    by_key: Mutex<IndexMap<K, Arc<LinkMetrics>>>,
    retain_idle: Duration,
}

impl<K: Hash + Eq + Clone> Registry<K> {
    pub fn new(retain_idle: Duration) -> Self {
        Self {
            by_key: Mutex::new(IndexMap::new()),
            retain_idle,
        }
    }

    pub fn get_or_create(&self, key: K) -> Arc<LinkMetrics> {
        let mut by_key = self.by_key.lock();
        by_key.entry(key).or_insert_with(|| Arc::new(LinkMetrics::new())).clone()
    }

    /// Retain metrics for all keys that either still have an external
    /// reference or were touched within `retain_idle` of now.
    pub fn retain_live(&self) {
        let now = Instant::now();
        let retain_idle = self.retain_idle;
        self.by_key.lock().retain(|_, m| {
            Arc::strong_count(m) > 1
                || m.last_update()
                    .map(|t| now.saturating_duration_since(t) < retain_idle)
                    .unwrap_or(true)
        });
    }

    pub fn len(&self) -> usize {
        self.by_key.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreferenced_stale_entries_are_pruned() {
        let registry: Registry<String> = Registry::new(Duration::from_millis(10));
        let m = registry.get_or_create("a".into());
        m.touch();
        drop(m);
        std::thread::sleep(Duration::from_millis(30));
        registry.retain_live();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn referenced_entries_survive_retain() {
        let registry: Registry<String> = Registry::new(Duration::from_millis(10));
        let m = registry.get_or_create("a".into());
        std::thread::sleep(Duration::from_millis(30));
        registry.retain_live();
        assert_eq!(registry.len(), 1);
        drop(m);
    }
}
