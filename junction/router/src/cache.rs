use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::context::CacheKey;
use crate::rule::RuleTarget;

const SHARD_COUNT: usize = 32;

#[derive(Clone, Debug)]
struct Entry {
    decision: RuleTarget,
    rule_tag: Option<String>,
    expires_at: Instant,
}

struct Shard {
    entries: HashMap<CacheKey, Entry>,
    /// Front = most recently used.
    order: VecDeque<CacheKey>,
    max_size: usize,
}

impl Shard {
    fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_front(key.clone());
    }

    fn get(&mut self, key: &CacheKey, now: Instant) -> Option<(RuleTarget, Option<String>)> {
        let expired = match self.entries.get(key) {
            Some(e) => e.expires_at <= now,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                self.order.remove(pos);
            }
            return None;
        }
        self.touch(key);
        self.entries
            .get(key)
            .map(|e| (e.decision.clone(), e.rule_tag.clone()))
    }

    fn sweep_expired(&mut self, now: Instant) {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.entries.remove(&key);
            if let Some(pos) = self.order.iter().position(|k| k == &key) {
                self.order.remove(pos);
            }
        }
    }

    fn put(&mut self, key: CacheKey, decision: RuleTarget, rule_tag: Option<String>, ttl: Duration, now: Instant) {
        if self.entries.contains_key(&key) {
            self.entries.insert(
                key.clone(),
                Entry {
                    decision,
                    rule_tag,
                    expires_at: now + ttl,
                },
            );
            self.touch(&key);
            return;
        }

        if self.entries.len() >= self.max_size {
            self.sweep_expired(now);
        }
        while self.entries.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_back() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }

        self.entries.insert(
            key.clone(),
            Entry {
                decision,
                rule_tag,
                expires_at: now + ttl,
            },
        );
        self.order.push_front(key);
    }

    fn invalidate_by_inbound_tag(&mut self, tag: &str) {
        let doomed: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|k| k.inbound_tag == tag)
            .cloned()
            .collect();
        for key in doomed {
            self.entries.remove(&key);
            if let Some(pos) = self.order.iter().position(|k| k == &key) {
                self.order.remove(pos);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// A polynomial hash of `(target-string, target-port, network)`, used
/// only to pick a shard — not a cryptographic hash.
fn shard_hash(key: &CacheKey) -> usize {
    let mut h: u64 = 0;
    for b in key.target_string.as_bytes() {
        h = h.wrapping_mul(31).wrapping_add(*b as u64);
    }
    h = h.wrapping_mul(31).wrapping_add(key.target_port as u64);
    h = h.wrapping_mul(31).wrapping_add(key.network as u64 + 1);
    (h % SHARD_COUNT as u64) as usize
}

/// A sharded LRU cache of routing decisions with a uniform TTL. Never
/// holds a decision whose rule names a balancer — callers must not call
/// `put` with `RuleTarget::Balancer`.
pub struct RouteCache {
    shards: Vec<Mutex<Shard>>,
    ttl: Duration,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RouteCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let per_shard = (max_entries / SHARD_COUNT).max(1);
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(Shard::new(per_shard))).collect();
        Self {
            shards,
            ttl,
            enabled: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn default_config() -> Self {
        Self::new(4096, Duration::from_secs(300))
    }

    fn shard_for(&self, key: &CacheKey) -> &Mutex<Shard> {
        &self.shards[shard_hash(key)]
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if !enabled {
            for shard in &self.shards {
                shard.lock().clear();
            }
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<(RuleTarget, Option<String>)> {
        if !self.is_enabled() {
            return None;
        }
        let result = self.shard_for(key).lock().get(key, Instant::now());
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Never stores a balancer-backed decision — enforces the "rules
    /// referencing a balancer are never cached" invariant at the one
    /// choke point rather than trusting every caller.
    pub fn put(&self, key: CacheKey, decision: RuleTarget, rule_tag: Option<String>) {
        if !self.is_enabled() {
            return;
        }
        if matches!(decision, RuleTarget::Balancer(_)) {
            return;
        }
        self.shard_for(&key)
            .lock()
            .put(key, decision, rule_tag, self.ttl, Instant::now());
    }

    pub fn invalidate_by_inbound_tag(&self, tag: &str) {
        for shard in &self.shards {
            shard.lock().invalidate_by_inbound_tag(tag);
        }
    }

    /// Drops every entry, e.g. when the rule set changes underneath it.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_core::Network;

    fn key(target: &str) -> CacheKey {
        CacheKey {
            target_string: target.into(),
            target_port: 80,
            network: Network::Tcp,
            inbound_tag: "in".into(),
            sniffed_protocol: None,
            user_id: None,
        }
    }

    #[test]
    fn hit_then_miss_after_ttl() {
        let cache = RouteCache::new(4096, Duration::from_millis(20));
        let k = key("example.com");
        cache.put(k.clone(), RuleTarget::Static("out-a".into()), None);
        assert!(cache.get(&k).is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn balancer_decisions_are_never_cached() {
        let cache = RouteCache::new(4096, Duration::from_secs(60));
        let k = key("example.com");
        cache.put(k.clone(), RuleTarget::Balancer("lb".into()), None);
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn eviction_drops_oldest_entry_when_full() {
        let cache = RouteCache::new(SHARD_COUNT, Duration::from_secs(60));
        // max_size per shard is 1 with this config; force both keys
        // into the same shard by giving them identical hash inputs
        // except via direct shard access semantics (same target+port+network).
        let k1 = key("same.example.com");
        let mut k2 = k1.clone();
        k2.inbound_tag = "other".into();
        cache.put(k1.clone(), RuleTarget::Static("a".into()), None);
        cache.put(k2.clone(), RuleTarget::Static("b".into()), None);
        // both keys share a shard (same hash inputs); the shard's
        // max_size of 1 means only the most recent survives.
        assert!(cache.get(&k2).is_some());
    }

    #[test]
    fn set_enabled_false_clears_cache() {
        let cache = RouteCache::new(4096, Duration::from_secs(60));
        let k = key("example.com");
        cache.put(k.clone(), RuleTarget::Static("out-a".into()), None);
        cache.set_enabled(false);
        assert!(cache.get(&k).is_none());
    }
}
