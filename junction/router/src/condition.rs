use crate::context::RoutingContext;

/// A single matcher in a rule's conjunction. Listed as one of the
/// capability interfaces in the design notes: dynamic dispatch across
/// matcher variants is modeled as trait objects rather than an enum, so
/// new matcher kinds can be added without touching the rule compiler.
pub trait Condition: Send + Sync {
    fn matches(&self, ctx: &RoutingContext) -> bool;

    fn name(&self) -> &'static str;
}

impl<F> Condition for F
where
    F: Fn(&RoutingContext) -> bool + Send + Sync,
{
    fn matches(&self, ctx: &RoutingContext) -> bool {
        (self)(ctx)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}
