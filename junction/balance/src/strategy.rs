use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::candidate::Candidate;

/// One balancing algorithm. Implementations see only the candidate list
/// handed to them on each call — no hidden state shared with the
/// dispatcher beyond what a strategy keeps for its own bookkeeping
/// (round-robin's cursor, least-load's stickiness).
pub trait BalancingStrategy: Send + Sync {
    fn pick(&self, candidates: &[Candidate]) -> Option<String>;

    fn name(&self) -> &'static str;
}

fn alive(candidates: &[Candidate]) -> Vec<&Candidate> {
    candidates.iter().filter(|c| c.alive).collect()
}

#[derive(Default)]
pub struct RandomStrategy;

impl BalancingStrategy for RandomStrategy {
    fn pick(&self, candidates: &[Candidate]) -> Option<String> {
        let pool = alive(candidates);
        if pool.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..pool.len());
        Some(pool[idx].tag.clone())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[derive(Default)]
pub struct RoundRobinStrategy {
    cursor: AtomicUsize,
}

impl BalancingStrategy for RoundRobinStrategy {
    fn pick(&self, candidates: &[Candidate]) -> Option<String> {
        let pool = alive(candidates);
        if pool.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
        Some(pool[idx].tag.clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[derive(Default)]
pub struct LeastPingStrategy;

impl BalancingStrategy for LeastPingStrategy {
    fn pick(&self, candidates: &[Candidate]) -> Option<String> {
        alive(candidates)
            .into_iter()
            .min_by(|a, b| {
                let da = a.delay.unwrap_or(std::time::Duration::MAX);
                let db = b.delay.unwrap_or(std::time::Duration::MAX);
                da.cmp(&db).then_with(|| a.tag.cmp(&b.tag))
            })
            .map(|c| c.tag.clone())
    }

    fn name(&self) -> &'static str {
        "least_ping"
    }
}
