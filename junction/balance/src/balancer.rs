use parking_lot::Mutex;

use junction_core::Error;

use crate::candidate::Candidate;
use crate::strategy::BalancingStrategy;

/// A named balancer: a strategy over a pool of candidates selected by tag
/// prefix, an optional fallback tag used when every candidate is dead, and
/// an optional manual pin that bypasses the strategy entirely (operator
/// override).
pub struct Balancer {
    pub tag: String,
    pub selectors: Vec<String>,
    strategy: Box<dyn BalancingStrategy>,
    fallback: Option<String>,
    manual_override: Mutex<Option<String>>,
}

impl Balancer {
    pub fn new(tag: impl Into<String>, strategy: Box<dyn BalancingStrategy>) -> Self {
        Self {
            tag: tag.into(),
            selectors: Vec::new(),
            strategy,
            fallback: None,
            manual_override: Mutex::new(None),
        }
    }

    pub fn with_selectors(mut self, selectors: Vec<String>) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn set_override(&self, tag: Option<String>) {
        *self.manual_override.lock() = tag;
    }

    pub fn override_tag(&self) -> Option<String> {
        self.manual_override.lock().clone()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Picks the outbound tag to use for `candidates`. A manual override
    /// wins unconditionally; otherwise the configured strategy picks,
    /// falling back to the configured fallback when the strategy finds
    /// nothing (e.g. every candidate is dead).
    pub fn pick(&self, candidates: &[Candidate]) -> Result<String, Error> {
        if let Some(pinned) = self.manual_override.lock().clone() {
            return Ok(pinned);
        }
        self.strategy
            .pick(candidates)
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| Error::BalancerEmpty(self.tag.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::RoundRobinStrategy;

    #[test]
    fn manual_override_wins_over_strategy() {
        let b = Balancer::new("lb", Box::new(RoundRobinStrategy::default()));
        b.set_override(Some("pinned".into()));
        let candidates = vec![Candidate::new("a"), Candidate::new("b")];
        assert_eq!(b.pick(&candidates).unwrap(), "pinned");
    }

    #[test]
    fn falls_back_when_nothing_alive() {
        let b = Balancer::new("lb", Box::new(RoundRobinStrategy::default())).with_fallback("rescue");
        let candidates = vec![Candidate::new("a").dead()];
        assert_eq!(b.pick(&candidates).unwrap(), "rescue");
    }

    #[test]
    fn empty_with_no_fallback_is_an_error() {
        let b = Balancer::new("lb", Box::new(RoundRobinStrategy::default()));
        let candidates: Vec<Candidate> = Vec::new();
        assert!(b.pick(&candidates).is_err());
    }
}
