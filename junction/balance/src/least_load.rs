use parking_lot::Mutex;

use crate::candidate::Candidate;
use crate::strategy::BalancingStrategy;

#[derive(Clone, Debug)]
struct Scored {
    tag: String,
    score: f64,
}

/// A score combining latency and throughput — lower is better. A
/// candidate with no throughput sample still scores on delay alone so a
/// freshly-added outbound isn't penalized to death before its first
/// benchmark round completes.
fn score(c: &Candidate) -> f64 {
    let delay_ms = c.delay.map(|d| d.as_secs_f64() * 1000.0).unwrap_or(f64::MAX);
    match c.throughput {
        Some(t) if t > 0.0 => delay_ms / t.max(1.0),
        _ => delay_ms,
    }
}

fn mean_stddev(scores: &[f64]) -> (f64, f64) {
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Picks the outbound with the best combined latency/throughput score,
/// trimming statistical outliers once there's enough of a sample to
/// trust a mean, and broadening the "best" set by a tolerance band so a
/// negligibly-better candidate doesn't cause constant switching. When
/// the previously-picked outbound is still within that band it is kept,
/// rather than re-evaluated as if it were a fresh candidate.
pub struct LeastLoadStrategy {
    tolerance_percent: f64,
    current: Mutex<Option<String>>,
}

impl LeastLoadStrategy {
    pub fn new(tolerance_percent: f64) -> Self {
        Self {
            tolerance_percent,
            current: Mutex::new(None),
        }
    }
}

impl Default for LeastLoadStrategy {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl BalancingStrategy for LeastLoadStrategy {
    fn pick(&self, candidates: &[Candidate]) -> Option<String> {
        let mut scored: Vec<Scored> = candidates
            .iter()
            .filter(|c| c.alive)
            .map(|c| Scored {
                tag: c.tag.clone(),
                score: score(c),
            })
            .collect();
        if scored.is_empty() {
            return None;
        }

        if scored.len() >= 3 {
            let raw_scores: Vec<f64> = scored.iter().map(|s| s.score).collect();
            let (mean, stddev) = mean_stddev(&raw_scores);
            if stddev > 0.0 {
                let cutoff = mean + 1.5 * stddev;
                let trimmed: Vec<Scored> = scored.iter().filter(|s| s.score <= cutoff).cloned().collect();
                if !trimmed.is_empty() {
                    scored = trimmed;
                }
            }
        }

        let best_score = scored.iter().map(|s| s.score).fold(f64::MAX, f64::min);
        let band = best_score * (1.0 + self.tolerance_percent / 100.0);
        let acceptable: Vec<&Scored> = scored.iter().filter(|s| s.score <= band).collect();

        let mut current = self.current.lock();
        if let Some(sticky) = current.as_ref() {
            if acceptable.iter().any(|s| &s.tag == sticky) {
                return Some(sticky.clone());
            }
        }

        let winner = acceptable
            .into_iter()
            .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap().then_with(|| a.tag.cmp(&b.tag)))
            .map(|s| s.tag.clone())?;
        *current = Some(winner.clone());
        Some(winner)
    }

    fn name(&self) -> &'static str {
        "least_load"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn prefers_lowest_combined_score() {
        let s = LeastLoadStrategy::new(10.0);
        let candidates = vec![
            Candidate::new("a").with_delay(Duration::from_millis(100)).with_throughput(1_000_000.0),
            Candidate::new("b").with_delay(Duration::from_millis(100)).with_throughput(10_000_000.0),
        ];
        assert_eq!(s.pick(&candidates), Some("b".to_string()));
    }

    #[test]
    fn sticks_with_current_pick_inside_tolerance_band() {
        let s = LeastLoadStrategy::new(10.0);
        let round1 = vec![
            Candidate::new("a").with_delay(Duration::from_millis(100)),
            Candidate::new("b").with_delay(Duration::from_millis(101)),
        ];
        let first = s.pick(&round1).unwrap();

        // swap which one is nominally "best" by a hair; still within band.
        let round2 = vec![
            Candidate::new("a").with_delay(Duration::from_millis(101)),
            Candidate::new("b").with_delay(Duration::from_millis(100)),
        ];
        assert_eq!(s.pick(&round2), Some(first));
    }

    #[test]
    fn outlier_is_trimmed_from_a_sample_of_three_or_more() {
        let s = LeastLoadStrategy::new(0.0);
        let candidates = vec![
            Candidate::new("a").with_delay(Duration::from_millis(50)),
            Candidate::new("b").with_delay(Duration::from_millis(55)),
            Candidate::new("c").with_delay(Duration::from_millis(50_000)),
        ];
        let pick = s.pick(&candidates).unwrap();
        assert_ne!(pick, "c");
    }

    #[test]
    fn dead_candidates_are_never_picked() {
        let s = LeastLoadStrategy::default();
        let candidates = vec![Candidate::new("a").dead()];
        assert_eq!(s.pick(&candidates), None);
    }
}
