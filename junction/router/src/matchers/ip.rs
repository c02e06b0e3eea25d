use std::net::IpAddr;

use ipnet::IpNet;

use crate::condition::Condition;
use crate::context::RoutingContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpRole {
    Source,
    Target,
    Local,
}

/// CIDR-list membership, combined across however many geo-IP groups fed
/// into `compile` (geo-IP dataset loading itself is out of scope; the
/// caller hands us the resolved `IpNet` list). Supports inverted
/// ("NOT in this list") semantics.
pub struct IpMatcher {
    role: IpRole,
    nets: Vec<IpNet>,
    invert: bool,
}

impl IpMatcher {
    pub fn new(role: IpRole, nets: Vec<IpNet>, invert: bool) -> Self {
        Self { role, nets, invert }
    }

    fn role_ip(&self, ctx: &RoutingContext) -> Option<IpAddr> {
        match self.role {
            IpRole::Source => ctx.source_ip,
            IpRole::Target => ctx.target_ip(),
            IpRole::Local => ctx.local_ip,
        }
    }
}

impl Condition for IpMatcher {
    fn matches(&self, ctx: &RoutingContext) -> bool {
        let Some(ip) = self.role_ip(ctx) else {
            return false;
        };
        let hit = self.nets.iter().any(|net| net.contains(&ip));
        hit ^ self.invert
    }

    fn name(&self) -> &'static str {
        "ip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_core::Network;

    #[test]
    fn matches_source_ip_in_cidr() {
        let nets = vec!["192.168.0.0/16".parse().unwrap()];
        let m = IpMatcher::new(IpRole::Source, nets, false);
        let mut ctx = RoutingContext::new(Network::Tcp);
        ctx.source_ip = Some("192.168.0.7".parse().unwrap());
        assert!(m.matches(&ctx));
        ctx.source_ip = Some("10.0.0.1".parse().unwrap());
        assert!(!m.matches(&ctx));
    }

    #[test]
    fn invert_flips_the_result() {
        let nets = vec!["10.0.0.0/8".parse().unwrap()];
        let m = IpMatcher::new(IpRole::Target, nets, true);
        let mut ctx = RoutingContext::new(Network::Tcp);
        ctx.target_ips = vec!["10.1.2.3".parse().unwrap()];
        assert!(!m.matches(&ctx));
        ctx.target_ips = vec!["8.8.8.8".parse().unwrap()];
        assert!(m.matches(&ctx));
    }
}
