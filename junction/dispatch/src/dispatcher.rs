use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::{TcpStream, UnixStream};
use tracing::warn;

use junction_balance::{Balancer, Candidate};
use junction_core::{Content, Destination, Error, InboundDescriptor, OutboundDescriptor, Policy, Result, Session};
use junction_inbound::ConnectionHandler;
use junction_metrics::Registry;
use junction_observatory::{Observatory, Prober};
use junction_outbound::{BoxedStream, OutboundManager};
use junction_router::{Route, Router, RoutingContext, RuleTarget};
use junction_task::{ActivityTimer, DoneBeacon};

use crate::sniff::{SniffResult, SnifferRegistry};

/// Ties routing, balancing, sniffing, and outbound dispatch together —
/// the one component allowed to depend on both `junction-router` and
/// `junction-balance`, per the router/balance split: `Router::pick_route`
/// returns an unresolved `RuleTarget::Balancer` tag, and only here does
/// that tag get turned into an actual outbound pick.
pub struct Dispatcher {
    router: Arc<Router>,
    outbounds: Arc<OutboundManager>,
    balancers: Mutex<HashMap<String, Arc<Balancer>>>,
    observatory: Option<Arc<Observatory>>,
    sniffers: SnifferRegistry,
    link_metrics: Arc<Registry<String>>,
    probe_destination: Destination,
    policy: Policy,
    /// Fixed per-inbound destinations for tunnel-style inbounds whose
    /// target is configured rather than discovered (the dokodemo-door
    /// style setup). Sniffing may still rewrite this per connection —
    /// e.g. a TLS SNI-bearing inbound overriding the configured target.
    inbound_destinations: Mutex<HashMap<String, Destination>>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>, outbounds: Arc<OutboundManager>, probe_destination: Destination) -> Self {
        Self {
            router,
            outbounds,
            balancers: Mutex::new(HashMap::new()),
            observatory: None,
            sniffers: SnifferRegistry::with_defaults(),
            link_metrics: Arc::new(Registry::new(Duration::from_secs(300))),
            probe_destination,
            policy: Policy::default(),
            inbound_destinations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_observatory(mut self, observatory: Arc<Observatory>) -> Self {
        self.observatory = Some(observatory);
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_inbound_destination(&self, inbound_tag: impl Into<String>, destination: Destination) {
        self.inbound_destinations.lock().insert(inbound_tag.into(), destination);
    }

    pub fn clear_inbound_destination(&self, inbound_tag: &str) {
        self.inbound_destinations.lock().remove(inbound_tag);
    }

    fn inbound_destination(&self, inbound_tag: &str) -> Option<Destination> {
        self.inbound_destinations.lock().get(inbound_tag).cloned()
    }

    /// Registers `balancer` for its own tag. Its candidate pool is not
    /// frozen at registration: every dispatch re-resolves it by asking
    /// `OutboundManager::select` for the outbounds currently matching the
    /// balancer's selector prefixes, so outbounds added or removed after
    /// registration are picked up without re-registering the balancer.
    pub fn register_balancer(&self, balancer: Arc<Balancer>) {
        self.balancers.lock().insert(balancer.tag.clone(), balancer);
    }

    pub fn unregister_balancer(&self, tag: &str) -> bool {
        self.balancers.lock().remove(tag).is_some()
    }

    pub fn get_balancer(&self, tag: &str) -> Option<Arc<Balancer>> {
        self.balancers.lock().get(tag).cloned()
    }

    pub fn balancer_tags(&self) -> Vec<String> {
        self.balancers.lock().keys().cloned().collect()
    }

    pub fn sniff(&self, buf: &[u8]) -> Option<SniffResult> {
        self.sniffers.sniff(buf)
    }

    pub fn metrics(&self) -> &Arc<Registry<String>> {
        &self.link_metrics
    }

    fn build_candidates(&self, tags: &[String]) -> Vec<Candidate> {
        tags.iter()
            .map(|tag| {
                let mut candidate = Candidate::new(tag.clone());
                if let Some(observatory) = &self.observatory {
                    if let Some(observation) = observatory.get_observation(tag) {
                        candidate.alive = observation.alive;
                        candidate.delay = observation.delay;
                    }
                }
                candidate
            })
            .collect()
    }

    fn resolve_balancer(&self, balancer_tag: &str) -> Result<String> {
        let balancer = {
            let balancers = self.balancers.lock();
            balancers
                .get(balancer_tag)
                .cloned()
                .ok_or_else(|| Error::UnknownBalancer(balancer_tag.to_string()))?
        };
        let tags = self.outbounds.select(&balancer.selectors);
        let candidates = self.build_candidates(&tags);
        balancer.pick(&candidates)
    }

    /// Resolves `ctx`/`destination` to a concrete outbound and dials it,
    /// touching that outbound's link metrics on success. Returns the
    /// route that produced the pick alongside the concrete outbound tag
    /// actually dialed (which, for a `RuleTarget::Balancer` route, is the
    /// balancer's pick rather than the balancer's own tag).
    pub async fn dispatch(&self, ctx: &mut RoutingContext, destination: &Destination) -> Result<(BoxedStream, Route, String)> {
        let route = self.router.pick_route(ctx).await?;
        let tag = match &route.decision {
            RuleTarget::Static(tag) => tag.clone(),
            RuleTarget::Balancer(balancer_tag) => self.resolve_balancer(balancer_tag)?,
        };
        let stream = self.outbounds.dial(&tag, destination).await?;
        self.link_metrics.get_or_create(tag.clone()).touch();
        Ok((stream, route, tag))
    }

    fn routing_context_for(
        &self,
        inbound_tag: &str,
        source: SocketAddr,
        destination: &Destination,
        sniffed: &Option<SniffResult>,
    ) -> RoutingContext {
        let mut ctx = RoutingContext::new(destination.network);
        ctx.inbound_tag = inbound_tag.to_string();
        ctx.source_ip = Some(source.ip());
        ctx.source_port = source.port();
        ctx.target_domain = destination.address.domain().map(str::to_string);
        if let Some(ip) = destination.address.ip() {
            ctx.target_ips = vec![ip];
        }
        ctx.target_port = destination.port;
        ctx.sniffed_protocol = sniffed.as_ref().map(|s| s.protocol.clone());
        ctx
    }

    /// Runs sniffing + routing + dial for a freshly accepted stream and
    /// splices it to whatever outbound was picked. Shared by the TCP and
    /// Unix accept paths; UDP datagrams go through `relay_datagram`
    /// instead since they have no persistent duplex stream to splice.
    /// `original_destination`, when set, is a TPROXY/REDIRECT-recovered
    /// pre-NAT address and takes priority over the inbound's statically
    /// configured one — there's no dokodemo-door-style config to fall
    /// back to on a genuinely transparent listener.
    async fn relay_stream<S>(&self, inbound: S, inbound_tag: &str, source: SocketAddr, original_destination: Option<SocketAddr>)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let configured = original_destination
            .map(|addr| Destination::tcp(junction_core::Address::Ip(addr.ip()), addr.port()))
            .or_else(|| self.inbound_destination(inbound_tag));
        let Some(configured) = configured else {
            warn!(inbound = inbound_tag, "no destination configured for inbound");
            return;
        };

        let session = Session::new(InboundDescriptor {
            tag: inbound_tag.to_string(),
            source: Destination::tcp(junction_core::Address::Ip(source.ip()), source.port()),
            gateway: configured.clone(),
            user: None,
        });

        let mut inbound = Prefixed::new(inbound);
        let mut peek_buf = [0u8; 4096];
        let sniffed = match tokio::time::timeout(self.policy.handshake, inbound.fill_prefix(&mut peek_buf)).await {
            Ok(n) => self.sniff(&peek_buf[..n]),
            Err(_) => None,
        };
        if let Some(result) = &sniffed {
            let mut content = Content::default();
            content.protocol = Some(result.protocol.clone());
            session.set_content(content);
        }
        let destination = sniffed
            .as_ref()
            .and_then(|s| s.rewritten_destination.clone())
            .unwrap_or(configured);

        let mut ctx = self.routing_context_for(inbound_tag, source, &destination, &sniffed);
        let (mut outbound, _route, tag) = match self.dispatch(&mut ctx, &destination).await {
            Ok(triple) => triple,
            Err(e) => {
                warn!(inbound = inbound_tag, session = session.id(), error = %e, "dispatch failed");
                return;
            }
        };
        session.push_outbound(OutboundDescriptor {
            tag,
            destination: destination.clone(),
        });

        let idle_beacon = DoneBeacon::new();
        let closer = idle_beacon.clone();
        let timer = Arc::new(ActivityTimer::start(self.policy.connection_idle, move || closer.close()));
        let mut inbound = ActivityTracked::new(inbound, timer.clone());
        let mut outbound = ActivityTracked::new(outbound, timer);

        tokio::select! {
            result = tokio::io::copy_bidirectional(&mut inbound, &mut outbound) => {
                if let Err(e) = result {
                    warn!(inbound = inbound_tag, session = session.id(), error = %e, "relay ended with an error");
                }
            }
            _ = idle_beacon.closed() => {
                warn!(inbound = inbound_tag, session = session.id(), idle = ?self.policy.connection_idle, "relay closed after idle timeout");
            }
        }
    }
}

/// Wraps a duplex stream so a sniffing prefix can be read off the front
/// without losing those bytes for the relay loop that follows: reads are
/// served from the buffered prefix first, then delegated straight
/// through to the inner stream. Writes always pass straight through.
struct Prefixed<S> {
    inner: S,
    prefix: bytes::BytesMut,
}

impl<S: tokio::io::AsyncRead + Unpin> Prefixed<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            prefix: bytes::BytesMut::new(),
        }
    }

    /// Reads into `buf` from the inner stream and also retains a copy to
    /// replay later, returning the number of bytes read.
    async fn fill_prefix(&mut self, buf: &mut [u8]) -> usize {
        use tokio::io::AsyncReadExt;
        let n = self.inner.read(buf).await.unwrap_or(0);
        self.prefix.extend_from_slice(&buf[..n]);
        n
    }
}

impl<S: tokio::io::AsyncRead + Unpin> tokio::io::AsyncRead for Prefixed<S> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if !self.prefix.is_empty() {
            let take = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(take);
            buf.put_slice(&chunk);
            return std::task::Poll::Ready(Ok(()));
        }
        std::pin::Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: tokio::io::AsyncWrite + Unpin> tokio::io::AsyncWrite for Prefixed<S> {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Bumps a shared [`ActivityTimer`] on every successful read or write, so
/// the idle timeout spans the whole relay rather than just its setup.
struct ActivityTracked<S> {
    inner: S,
    timer: Arc<ActivityTimer>,
}

impl<S> ActivityTracked<S> {
    fn new(inner: S, timer: Arc<ActivityTimer>) -> Self {
        Self { inner, timer }
    }
}

impl<S: tokio::io::AsyncRead + Unpin> tokio::io::AsyncRead for ActivityTracked<S> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = std::pin::Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(poll, std::task::Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.timer.bump();
        }
        poll
    }
}

impl<S: tokio::io::AsyncWrite + Unpin> tokio::io::AsyncWrite for ActivityTracked<S> {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let poll = std::pin::Pin::new(&mut self.inner).poll_write(cx, buf);
        if let std::task::Poll::Ready(Ok(n)) = &poll {
            if *n > 0 {
                self.timer.bump();
            }
        }
        poll
    }

    fn poll_flush(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl Prober for Dispatcher {
    async fn probe(&self, outbound_tag: &str) -> Result<Duration> {
        let start = Instant::now();
        self.outbounds.dial(outbound_tag, &self.probe_destination).await?;
        Ok(start.elapsed())
    }
}

#[async_trait]
impl ConnectionHandler for Dispatcher {
    async fn handle_tcp(&self, stream: TcpStream, peer: SocketAddr, inbound_tag: &str, original_destination: Option<SocketAddr>) {
        self.relay_stream(stream, inbound_tag, peer, original_destination).await;
    }

    async fn handle_unix(&self, stream: UnixStream, inbound_tag: &str) {
        // Unix inbounds have no peer address; attribute the flow to the
        // loopback so rules keyed on source IP still have something to
        // compare against rather than panicking on a missing value.
        let pseudo_peer = SocketAddr::from(([127, 0, 0, 1], 0));
        self.relay_stream(stream, inbound_tag, pseudo_peer, None).await;
    }

    /// Single-shot UDP relay: dials fresh per datagram rather than
    /// keeping a per-session outbound socket open. Correct for
    /// request/response UDP protocols (DNS, STUN) but not for ones that
    /// expect the same outbound 5-tuple across datagrams in a session —
    /// a persistent per-session outbound would need its own mapping
    /// table alongside `junction_inbound::NatTable`.
    async fn handle_udp_datagram(
        &self,
        data: &[u8],
        _peer: SocketAddr,
        local: SocketAddr,
        inbound_tag: &str,
        _is_new_session: bool,
    ) -> Option<Vec<u8>> {
        let destination = self.inbound_destination(inbound_tag)?;
        let mut ctx = self.routing_context_for(inbound_tag, local, &destination, &None);
        let (mut outbound, _route, _tag) = match self.dispatch(&mut ctx, &destination).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(inbound = inbound_tag, error = %e, "udp dispatch failed");
                return None;
            }
        };

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        if let Err(e) = outbound.write_all(data).await {
            warn!(inbound = inbound_tag, error = %e, "udp outbound write failed");
            return None;
        }
        let mut reply = vec![0u8; 65536];
        match tokio::time::timeout(Duration::from_secs(5), outbound.read(&mut reply)).await {
            Ok(Ok(n)) if n > 0 => {
                reply.truncate(n);
                Some(reply)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;
    use junction_balance::RoundRobinStrategy;
    use junction_core::{Address, Network};
    use junction_outbound::OutboundHandler;
    use junction_router::DomainStrategy;
    use tokio::io::duplex;

    struct FakeOutbound {
        tag: String,
    }

    #[at]
    impl OutboundHandler for FakeOutbound {
        fn tag(&self) -> &str {
            &self.tag
        }

        async fn dial(&self, _destination: &Destination) -> Result<BoxedStream> {
            let (a, _b) = duplex(64);
            Ok(Box::new(a))
        }
    }

    fn dest() -> Destination {
        Destination::tcp(Address::Domain("example.com".into()), 443)
    }

    #[tokio::test]
    async fn static_route_dials_its_outbound_directly() {
        let router = Arc::new(Router::new(DomainStrategy::AsIs));
        router.set_default_target(Some(RuleTarget::Static("direct".into())));
        let outbounds = Arc::new(OutboundManager::new());
        outbounds.add_handler(Arc::new(FakeOutbound { tag: "direct".into() })).unwrap();

        let dispatcher = Dispatcher::new(router, outbounds, dest());
        let mut ctx = RoutingContext::new(Network::Tcp);
        let (_, route, tag) = dispatcher.dispatch(&mut ctx, &dest()).await.unwrap();
        assert_eq!(route.outbound_tag_if_static(), Some("direct"));
        assert_eq!(tag, "direct");
    }

    #[tokio::test]
    async fn balancer_route_resolves_through_registered_balancer() {
        let router = Arc::new(Router::new(DomainStrategy::AsIs));
        router.set_default_target(Some(RuleTarget::Balancer("lb".into())));
        let outbounds = Arc::new(OutboundManager::new());
        outbounds.add_handler(Arc::new(FakeOutbound { tag: "node-a".into() })).unwrap();

        let dispatcher = Dispatcher::new(router, outbounds, dest());
        let balancer = Arc::new(
            Balancer::new("lb", Box::new(RoundRobinStrategy::default())).with_selectors(vec!["node-a".into()]),
        );
        dispatcher.register_balancer(balancer);

        let mut ctx = RoutingContext::new(Network::Tcp);
        let (_, _route, tag) = dispatcher.dispatch(&mut ctx, &dest()).await.unwrap();
        assert_eq!(tag, "node-a");
        assert_eq!(dispatcher.metrics().len(), 1);
    }

    #[tokio::test]
    async fn unregistered_balancer_is_an_error() {
        let router = Arc::new(Router::new(DomainStrategy::AsIs));
        router.set_default_target(Some(RuleTarget::Balancer("ghost".into())));
        let outbounds = Arc::new(OutboundManager::new());
        let dispatcher = Dispatcher::new(router, outbounds, dest());
        let mut ctx = RoutingContext::new(Network::Tcp);
        let err = match dispatcher.dispatch(&mut ctx, &dest()).await {
            Err(e) => e,
            Ok(_) => panic!("expected dispatch to fail"),
        };
        assert!(matches!(err, Error::UnknownBalancer(_)));
    }
}
