//! End-to-end coverage of the seed scenarios and universal properties,
//! exercising real crate boundaries (router, balance, inbound, vision)
//! rather than re-testing what each crate's own unit tests already cover
//! in isolation.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use junction_balance::{Balancer, Candidate, RoundRobinStrategy};
use junction_core::{Address, Destination, Error, Network, Result};
use junction_inbound::{NatTable, PortAllocator};
use junction_outbound::{BoxedStream, OutboundHandler, OutboundManager};
use junction_router::matchers::{DomainMatchType, DomainMatcher, IpMatcher, IpRole};
use junction_router::{DnsResolver, DomainStrategy, Route, RouteCache, Router, Rule, RoutingContext, RuleTarget};
use junction_vision::{Command, PaddingReader, VisionWriter};

struct DummyOutbound {
    tag: String,
}

#[async_trait]
impl OutboundHandler for DummyOutbound {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn dial(&self, _destination: &Destination) -> Result<BoxedStream> {
        let (a, _b) = tokio::io::duplex(64);
        Ok(Box::new(a))
    }
}

fn manager_with(tags: &[&str]) -> Arc<OutboundManager> {
    let mgr = Arc::new(OutboundManager::new());
    for tag in tags {
        mgr.add_handler(Arc::new(DummyOutbound { tag: tag.to_string() })).unwrap();
    }
    mgr
}

// Scenario 1: domain-rule match, static tag, cache miss then hit.
#[tokio::test]
async fn domain_rule_match_caches_after_first_lookup() {
    let cache = Arc::new(RouteCache::new(64, Duration::from_secs(60)));
    let router = Router::new(DomainStrategy::AsIs).with_cache(cache.clone());
    let matcher = DomainMatcher::compile(&[(DomainMatchType::Subdomain, "example.com")]).unwrap();
    router.append_rule(Rule::new("", RuleTarget::Static("out-a".into()), vec![Box::new(matcher)]).unwrap());

    let mut ctx = RoutingContext::new(Network::Tcp);
    ctx.target_domain = Some("www.example.com".to_string());
    ctx.target_port = 80;

    assert_eq!(cache.misses(), 0);
    let route = router.pick_route(&mut ctx).await.unwrap();
    assert_eq!(route.outbound_tag_if_static(), Some("out-a"));
    assert_eq!(route.rule_tag.as_deref(), Some(""));

    let route_again = router.pick_route(&mut ctx).await.unwrap();
    assert_eq!(route_again.outbound_tag_if_static(), Some("out-a"));
    assert!(cache.hits() >= 1);
}

// Scenario 2: geo-IP source rule.
#[tokio::test]
async fn geoip_source_rule_matches_lan_range() {
    let router = Router::new(DomainStrategy::AsIs);
    let matcher = IpMatcher::new(IpRole::Source, vec!["192.168.0.0/16".parse().unwrap()], false);
    router.append_rule(Rule::new("lan-rule", RuleTarget::Static("lan".into()), vec![Box::new(matcher)]).unwrap());

    let mut ctx = RoutingContext::new(Network::Tcp);
    ctx.source_ip = Some("192.168.0.7".parse::<IpAddr>().unwrap());

    let route = router.pick_route(&mut ctx).await.unwrap();
    assert_eq!(route.outbound_tag_if_static(), Some("lan"));
}

struct FixedResolver {
    ips: Vec<IpAddr>,
}

#[async_trait]
impl DnsResolver for FixedResolver {
    async fn resolve(&self, _domain: &str) -> Result<Vec<IpAddr>> {
        Ok(self.ips.clone())
    }
}

// Scenario 3: DomainStrategy::IpIfNonMatch resolves and re-runs against
// an IP-only rule when the as-is pass finds nothing.
#[tokio::test]
async fn ip_if_non_match_resolves_then_matches_on_second_pass() {
    let resolver = Arc::new(FixedResolver {
        ips: vec!["192.168.0.1".parse().unwrap()],
    });
    let router = Router::new(DomainStrategy::IpIfNonMatch).with_resolver(resolver);
    let matcher = IpMatcher::new(IpRole::Target, vec!["192.168.0.0/16".parse().unwrap()], false);
    router.append_rule(Rule::new("a", RuleTarget::Static("a".into()), vec![Box::new(matcher)]).unwrap());

    let mut ctx = RoutingContext::new(Network::Tcp);
    ctx.target_domain = Some("example.com".to_string());
    ctx.target_port = 80;

    let route = router.pick_route(&mut ctx).await.unwrap();
    assert_eq!(route.outbound_tag_if_static(), Some("a"));
    assert_eq!(ctx.target_ips, vec!["192.168.0.1".parse::<IpAddr>().unwrap()]);
}

// Scenario 4: round-robin over three outbounds with one marked dead —
// picks skip it entirely.
#[test]
fn round_robin_skips_dead_candidate() {
    let balancer = Balancer::new("lb", Box::new(RoundRobinStrategy::default()));
    let candidates = vec![
        Candidate::new("x"),
        Candidate::new("y").dead(),
        Candidate::new("z"),
    ];
    let picks: Vec<String> = (0..4).map(|_| balancer.pick(&candidates).unwrap()).collect();
    assert_eq!(picks, vec!["x", "z", "x", "z"]);
}

// Scenario 5: Vision's TLS filter watches a real ClientHello go by, then
// auto-derives Direct (rather than the caller hand-picking a command) the
// moment it sees the first application-data record that follows a TLS 1.3
// handshake, with the splice gate only opening at that point.
fn tls13_client_hello() -> Vec<u8> {
    let supported_versions_ext = [0x00u8, 43, 0x00, 3, 2, 0x03, 0x04];
    let mut hello = vec![0x16, 0x03, 0x01, 0x00, 0x00, 0x01];
    hello.extend_from_slice(&[0x03, 0x03]);
    hello.extend_from_slice(&[0u8; 32]);
    hello.push(0);
    hello.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]);
    hello.push(1);
    hello.push(0);
    hello.extend_from_slice(&(supported_versions_ext.len() as u16).to_be_bytes());
    hello.extend_from_slice(&supported_versions_ext);
    hello
}

#[tokio::test]
async fn vision_filter_opens_the_splice_gate_on_the_first_application_data_record() {
    let hello = tls13_client_hello();
    let application_data: Vec<u8> = [0x17u8, 0x03, 0x03].iter().copied().chain(std::iter::repeat(0x41).take(34)).collect();
    assert_eq!(application_data.len(), 37);

    let mut wire = Vec::new();
    {
        let mut writer = VisionWriter::new(&mut wire, uuid::Uuid::new_v4());
        writer.write(&hello).await.unwrap();
        assert!(!writer.splice_ready());
        writer.write(&application_data).await.unwrap();
        assert!(writer.splice_ready());
    }

    let mut reader = PaddingReader::new(wire.as_slice());
    let (hello_cmd, hello_back) = reader.read_frame().await.unwrap();
    assert_eq!(hello_cmd, Command::PaddingContinue);
    assert_eq!(&hello_back[..], &hello[..]);

    let (data_cmd, data_back) = reader.read_frame().await.unwrap();
    assert_eq!(data_cmd, Command::Direct);
    assert_eq!(&data_back[..], &application_data[..]);
}

// Scenario 6: UDP session reuse — two datagrams from the same source
// within a short window share a single NAT mapping regardless of target
// in cone mode.
#[test]
fn udp_session_reuse_keeps_a_single_active_mapping() {
    let nat: NatTable<u32> = NatTable::new(true);
    let client = "10.0.0.5:51000".parse().unwrap();
    let target_a = "93.184.216.34:80".parse().unwrap();
    let target_b = "93.184.216.34:443".parse().unwrap();

    let (first, created) = nat.get_or_create(client, target_a, || 1);
    assert!(created);
    let (second, created_again) = nat.get_or_create(client, target_b, || 2);
    assert!(!created_again);
    assert_eq!(first, second);
    assert_eq!(nat.len(), 1);
}

// Universal property: port allocator uniqueness under concurrent use.
#[tokio::test]
async fn port_allocator_hands_out_unique_ports_under_concurrency() {
    let pool = Arc::new(PortAllocator::new(45000, 45007));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move { pool.allocate().unwrap() }));
    }
    let mut ports = Vec::new();
    for handle in handles {
        ports.push(handle.await.unwrap());
    }
    let mut sorted = ports.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), ports.len(), "every concurrently allocated port must be unique");
}

// Universal property: cache rule-with-balancer exclusion, checked at the
// router level rather than calling RouteCache::put directly.
#[tokio::test]
async fn router_never_caches_a_balancer_decision() {
    let cache = Arc::new(RouteCache::new(64, Duration::from_secs(60)));
    let router = Router::new(DomainStrategy::AsIs).with_cache(cache.clone());
    let matcher = DomainMatcher::compile(&[(DomainMatchType::Full, "lb.example.com")]).unwrap();
    router.append_rule(Rule::new("r", RuleTarget::Balancer("pool".into()), vec![Box::new(matcher)]).unwrap());

    let mut ctx = RoutingContext::new(Network::Tcp);
    ctx.target_domain = Some("lb.example.com".to_string());

    let route = router.pick_route(&mut ctx).await.unwrap();
    assert_eq!(route.balancer_tag(), Some("pool"));
    assert_eq!(cache.get(&ctx.cache_key()), None);
}

// Universal property: router determinism for a fixed rule set and
// routing context, independent of call count.
#[tokio::test]
async fn router_picks_are_deterministic_across_repeated_calls() {
    let router = Router::new(DomainStrategy::AsIs);
    let matcher = DomainMatcher::compile(&[(DomainMatchType::Full, "stable.example.com")]).unwrap();
    router.append_rule(Rule::new("r", RuleTarget::Static("out".into()), vec![Box::new(matcher)]).unwrap());

    for _ in 0..5 {
        let mut ctx = RoutingContext::new(Network::Tcp);
        ctx.target_domain = Some("stable.example.com".to_string());
        let route = router.pick_route(&mut ctx).await.unwrap();
        assert_eq!(route.outbound_tag_if_static(), Some("out"));
    }
}

// A dispatch-shaped composition: router resolves a balancer tag, the
// balancer excludes a dead candidate, and the chosen outbound is actually
// present in the manager — without constructing a full Dispatcher, this
// pins down that the three crates agree on tag naming end to end.
#[tokio::test]
async fn router_and_balancer_agree_on_a_live_outbound_tag() {
    let outbounds = manager_with(&["node-a", "node-b"]);
    let router = Router::new(DomainStrategy::AsIs);
    router.set_default_target(Some(RuleTarget::Balancer("pool".into())));

    let balancer = Balancer::new("pool", Box::new(RoundRobinStrategy::default()));
    let candidates = vec![Candidate::new("node-a").dead(), Candidate::new("node-b")];

    let mut ctx = RoutingContext::new(Network::Tcp);
    let route: Route = router.pick_route(&mut ctx).await.unwrap();
    let tag = balancer.pick(&candidates).unwrap();
    assert_eq!(route.balancer_tag(), Some("pool"));
    assert_eq!(tag, "node-b");

    let dest = Destination::tcp(Address::Domain("example.com".into()), 443);
    outbounds.dial(&tag, &dest).await.unwrap();
    let err = match outbounds.dial("node-c", &dest).await {
        Err(e) => e,
        Ok(_) => panic!("expected dial to fail"),
    };
    assert!(matches!(err, Error::UnknownOutbound(_)));
}
