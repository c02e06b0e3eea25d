use crate::condition::Condition;
use crate::context::RoutingContext;
use crate::matchers::ip::IpRole;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortRole {
    Source,
    Target,
    Local,
}

impl From<IpRole> for PortRole {
    fn from(r: IpRole) -> Self {
        match r {
            IpRole::Source => PortRole::Source,
            IpRole::Target => PortRole::Target,
            IpRole::Local => PortRole::Local,
        }
    }
}

/// Membership in a union of inclusive port ranges.
pub struct PortMatcher {
    role: PortRole,
    ranges: Vec<(u16, u16)>,
}

impl PortMatcher {
    pub fn new(role: PortRole, ranges: Vec<(u16, u16)>) -> Self {
        Self { role, ranges }
    }

    fn role_port(&self, ctx: &RoutingContext) -> u16 {
        match self.role {
            PortRole::Source => ctx.source_port,
            PortRole::Target => ctx.target_port,
            PortRole::Local => ctx.local_port,
        }
    }
}

impl Condition for PortMatcher {
    fn matches(&self, ctx: &RoutingContext) -> bool {
        let port = self.role_port(ctx);
        self.ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&port))
    }

    fn name(&self) -> &'static str {
        "port"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_core::Network;

    #[test]
    fn matches_any_range_in_the_union() {
        let m = PortMatcher::new(PortRole::Target, vec![(80, 80), (8000, 8999)]);
        let mut ctx = RoutingContext::new(Network::Tcp);
        ctx.target_port = 8080;
        assert!(m.matches(&ctx));
        ctx.target_port = 443;
        assert!(!m.matches(&ctx));
    }
}
