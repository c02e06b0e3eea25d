use junction_core::Error;

use crate::condition::Condition;
use crate::context::RoutingContext;

/// Exactly one of these is set on a compiled rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleTarget {
    Static(String),
    Balancer(String),
}

/// A compiled routing rule: a conjunction of matchers plus the outbound
/// (static or via a balancer) to use when every matcher is satisfied.
pub struct Rule {
    pub tag: String,
    pub target: RuleTarget,
    /// Arbitrary labels carried through to a matching `Route`'s
    /// `group_tags`, e.g. for rules authored as part of a named bundle.
    pub groups: Vec<String>,
    conditions: Vec<Box<dyn Condition>>,
}

impl Rule {
    pub fn new(
        tag: impl Into<String>,
        target: RuleTarget,
        conditions: Vec<Box<dyn Condition>>,
    ) -> Result<Self, Error> {
        if conditions.is_empty() {
            return Err(Error::Other(
                "a rule's matcher list must be non-empty".into(),
            ));
        }
        Ok(Self {
            tag: tag.into(),
            target,
            groups: Vec::new(),
            conditions,
        })
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = String>) -> Self {
        self.groups = groups.into_iter().collect();
        self
    }

    pub fn matches(&self, ctx: &RoutingContext) -> bool {
        self.conditions.iter().all(|c| c.matches(ctx))
    }

    pub fn is_balancer(&self) -> bool {
        matches!(self.target, RuleTarget::Balancer(_))
    }
}

/// The output of routing: an outbound tag (or a balancer tag still
/// pending resolution) plus the rule tag and any group tags that
/// produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub decision: RuleTarget,
    pub rule_tag: Option<String>,
    pub group_tags: Vec<String>,
}

impl Route {
    pub fn outbound_tag_if_static(&self) -> Option<&str> {
        match &self.decision {
            RuleTarget::Static(tag) => Some(tag.as_str()),
            RuleTarget::Balancer(_) => None,
        }
    }

    pub fn balancer_tag(&self) -> Option<&str> {
        match &self.decision {
            RuleTarget::Balancer(tag) => Some(tag.as_str()),
            RuleTarget::Static(_) => None,
        }
    }
}
