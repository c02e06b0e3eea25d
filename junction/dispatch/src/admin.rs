use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use junction_balance::Balancer;
use junction_core::{Destination, Error, Result};
use junction_inbound::{BindAddress, InboundManager, PortAllocator};
use junction_observatory::{Observatory, ObservationStatus};
use junction_outbound::{OutboundHandler, OutboundManager};
use junction_router::{Router, Rule, RuleTarget};

use crate::dispatcher::Dispatcher;
use crate::webhook::{WebhookEvent, WebhookNotifier};

/// The callable surface §6's gRPC management facade would be a thin
/// wrapper over: plain async methods on a running proxy instance, with
/// no `tonic`/`prost` dependency introduced here. A real server binds
/// these one-to-one to RPC handlers.
pub struct Runtime {
    pub router: Arc<Router>,
    pub inbound: Arc<InboundManager>,
    pub outbound: Arc<OutboundManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub observatory: Option<Arc<Observatory>>,
    pub webhook: Option<Arc<WebhookNotifier>>,
    /// Inbound tag -> the set of user emails currently provisioned on it.
    /// Membership here is advisory bookkeeping only: nothing yet consults
    /// it to accept or reject a connection, since no inbound performs
    /// per-user authentication.
    users: Mutex<HashMap<String, HashSet<String>>>,
}

impl Runtime {
    pub fn new(router: Arc<Router>, inbound: Arc<InboundManager>, outbound: Arc<OutboundManager>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            router,
            inbound,
            outbound,
            dispatcher,
            observatory: None,
            webhook: None,
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_observatory(mut self, observatory: Arc<Observatory>) -> Self {
        self.observatory = Some(observatory);
        self
    }

    pub fn with_webhook(mut self, webhook: Arc<WebhookNotifier>) -> Self {
        self.webhook = Some(webhook);
        self
    }

    /// Starts a fixed-address inbound whose traffic dispatches to
    /// `destination` unless a sniffer rewrites it.
    pub async fn add_inbound(&self, tag: impl Into<String>, addr: BindAddress, destination: Destination) -> Result<()> {
        let tag = tag.into();
        self.dispatcher.set_inbound_destination(tag.clone(), destination);
        if let Err(e) = self
            .inbound
            .add_handler(tag.clone(), addr, self.dispatcher.clone())
            .await
        {
            self.dispatcher.clear_inbound_destination(&tag);
            return Err(e);
        }
        Ok(())
    }

    /// Starts a dynamic TCP inbound drawing its port from `pool`,
    /// returning the port it bound to. The listener rebinds to a fresh
    /// port from `pool` every `refresh`, draining and releasing the
    /// displaced one after twice that interval.
    pub async fn add_dynamic_inbound(
        &self,
        tag: impl Into<String>,
        host: std::net::IpAddr,
        pool: Arc<PortAllocator>,
        destination: Destination,
        refresh: Duration,
    ) -> Result<u16> {
        let tag = tag.into();
        self.dispatcher.set_inbound_destination(tag.clone(), destination);
        match self
            .inbound
            .clone()
            .add_dynamic_tcp_handler(tag.clone(), host, pool, self.dispatcher.clone(), refresh)
            .await
        {
            Ok(port) => Ok(port),
            Err(e) => {
                self.dispatcher.clear_inbound_destination(&tag);
                Err(e)
            }
        }
    }

    pub async fn remove_inbound(&self, tag: &str) -> bool {
        self.dispatcher.clear_inbound_destination(tag);
        self.users.lock().remove(tag);
        self.inbound.remove_handler(tag).await
    }

    /// Repoints an already-running inbound at a new destination without
    /// tearing down its listener.
    pub fn alter_inbound(&self, tag: &str, destination: Destination) -> Result<()> {
        if self.inbound.get(tag).is_none() {
            return Err(Error::Other(format!("no such inbound: {tag}")));
        }
        self.dispatcher.set_inbound_destination(tag, destination);
        Ok(())
    }

    pub fn list_inbounds(&self) -> Vec<String> {
        self.inbound.tags()
    }

    /// Records that `email` is provisioned on `inbound_tag`. Returns
    /// `false` if it was already present.
    pub fn add_user(&self, inbound_tag: impl Into<String>, email: impl Into<String>) -> bool {
        self.users
            .lock()
            .entry(inbound_tag.into())
            .or_default()
            .insert(email.into())
    }

    pub fn remove_user(&self, inbound_tag: &str, email: &str) -> bool {
        match self.users.lock().get_mut(inbound_tag) {
            Some(emails) => emails.remove(email),
            None => false,
        }
    }

    pub fn get_inbound_users(&self, inbound_tag: &str) -> Vec<String> {
        self.users
            .lock()
            .get(inbound_tag)
            .map(|emails| emails.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_inbound_users_count(&self, inbound_tag: &str) -> usize {
        self.users.lock().get(inbound_tag).map(HashSet::len).unwrap_or(0)
    }

    pub fn add_outbound(&self, handler: Arc<dyn OutboundHandler>) -> Result<()> {
        let tag = handler.tag().to_string();
        self.outbound.add_handler(handler)?;
        if let Some(observatory) = &self.observatory {
            observatory.add_subject(tag);
        }
        Ok(())
    }

    pub fn remove_outbound(&self, tag: &str) -> bool {
        if let Some(observatory) = &self.observatory {
            observatory.remove_subject(tag);
        }
        self.outbound.remove_handler(tag)
    }

    /// Swaps an outbound's handler in place: removed (observatory subject
    /// dropped along with it) then immediately re-added under the same
    /// tag, so in-flight dials that already resolved a candidate tag are
    /// unaffected and only new dials see the new handler.
    pub fn alter_outbound(&self, handler: Arc<dyn OutboundHandler>) -> Result<()> {
        let tag = handler.tag().to_string();
        self.remove_outbound(&tag);
        self.add_outbound(handler)
    }

    pub fn get_outbound_status(&self, tag: &str) -> Option<ObservationStatus> {
        self.observatory.as_ref().and_then(|o| o.get_observation(tag))
    }

    pub fn list_outbounds(&self) -> Vec<String> {
        self.outbound.tags()
    }

    /// Registers `balancer`, resolving its candidate pool at dispatch time
    /// from `balancer.selectors` rather than freezing it now. Re-adding a
    /// tag already in use replaces the prior balancer outright.
    pub fn add_balancer(&self, balancer: Arc<Balancer>) {
        self.dispatcher.register_balancer(balancer);
    }

    /// `add_balancer` is already an upsert, so altering is the same call.
    pub fn alter_balancer(&self, balancer: Arc<Balancer>) {
        self.dispatcher.register_balancer(balancer);
    }

    pub fn remove_balancer(&self, tag: &str) -> bool {
        self.dispatcher.unregister_balancer(tag)
    }

    pub fn get_balancers(&self) -> Vec<String> {
        self.dispatcher.balancer_tags()
    }

    /// Pins `balancer_tag` to always resolve to `outbound_tag`, bypassing
    /// its strategy until cleared. Errors if the balancer isn't registered.
    pub fn set_override_target(&self, balancer_tag: &str, outbound_tag: Option<String>) -> Result<()> {
        let balancer = self
            .dispatcher
            .get_balancer(balancer_tag)
            .ok_or_else(|| Error::UnknownBalancer(balancer_tag.to_string()))?;
        balancer.set_override(outbound_tag);
        Ok(())
    }

    pub fn get_override_target(&self, balancer_tag: &str) -> Option<String> {
        self.dispatcher.get_balancer(balancer_tag)?.override_tag()
    }

    pub fn add_rule(&self, rule: Rule) {
        self.router.append_rule(rule);
    }

    /// Upserts a rule by tag in place, preserving its position in the
    /// match order when it already existed.
    pub fn alter_rule(&self, rule: Rule) {
        self.router.alter_rule(rule);
    }

    pub fn set_rules(&self, rules: Vec<Rule>) {
        self.router.replace_rules(rules);
    }

    pub fn get_rules(&self) -> Vec<(String, RuleTarget, Vec<String>)> {
        self.router.rule_summaries()
    }

    pub fn get_rule(&self, tag: &str) -> Option<(String, RuleTarget, Vec<String>)> {
        self.router.rule_summary(tag)
    }

    pub fn remove_rule(&self, tag: &str) -> bool {
        self.router.remove_rule(tag)
    }

    /// The fallback decision used when no rule matches.
    pub fn get_principle_target(&self) -> Option<RuleTarget> {
        self.router.default_target()
    }

    pub fn set_restriction(&self, decision: RuleTarget, ttl: Option<Duration>) {
        self.router.set_restriction(decision, ttl);
    }

    pub fn clear_restriction(&self) {
        self.router.clear_restriction();
    }

    pub async fn fire_webhook(&self, event: WebhookEvent) -> Result<bool> {
        match &self.webhook {
            Some(notifier) => notifier.fire(event).await,
            None => Ok(false),
        }
    }

    /// Shuts down every running inbound and the observatory's background
    /// probing loop. Outbound handlers and the webhook notifier's cleanup
    /// task are dropped along with the `Runtime` itself.
    pub async fn shutdown(&self) {
        self.inbound.close_all().await;
        if let Some(observatory) = &self.observatory {
            observatory.close().await;
        }
        if let Some(webhook) = &self.webhook {
            webhook.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use junction_core::{Address, Network};
    use junction_observatory::Prober;
    use junction_outbound::BoxedStream;
    use junction_router::DomainStrategy;
    use tokio::io::duplex;

    struct FakeOutbound {
        tag: String,
    }

    #[async_trait]
    impl OutboundHandler for FakeOutbound {
        fn tag(&self) -> &str {
            &self.tag
        }

        async fn dial(&self, _destination: &Destination) -> Result<BoxedStream> {
            let (a, _b) = duplex(64);
            Ok(Box::new(a))
        }
    }

    fn runtime() -> Runtime {
        let router = Arc::new(Router::new(DomainStrategy::AsIs));
        let inbound = Arc::new(InboundManager::new(Arc::new(junction_inbound::LoopbackSocketFactory)));
        let outbound = Arc::new(OutboundManager::new());
        let probe_dest = Destination::tcp(Address::Domain("probe.internal".into()), 80);
        let dispatcher = Arc::new(Dispatcher::new(router.clone(), outbound.clone(), probe_dest));
        Runtime::new(router, inbound, outbound, dispatcher)
    }

    #[tokio::test]
    async fn adding_and_removing_an_inbound_round_trips() {
        let rt = runtime();
        let dest = Destination::tcp(Address::Domain("example.com".into()), 443);
        let addr = BindAddress::tcp("127.0.0.1:0".parse().unwrap());
        rt.add_inbound("in1", addr, dest).await.unwrap();
        assert_eq!(rt.inbound.tags(), vec!["in1".to_string()]);
        assert!(rt.remove_inbound("in1").await);
        assert!(!rt.remove_inbound("in1").await);
    }

    #[test]
    fn add_outbound_registers_it_with_the_manager() {
        let rt = runtime();
        rt.add_outbound(Arc::new(FakeOutbound { tag: "direct".into() })).unwrap();
        assert_eq!(rt.list_outbounds(), vec!["direct".to_string()]);
    }

    #[test]
    fn altering_an_unknown_inbound_is_an_error() {
        let rt = runtime();
        let dest = Destination::tcp(Address::Domain("example.com".into()), 443);
        assert!(rt.alter_inbound("ghost", dest).is_err());
    }

    #[tokio::test]
    async fn fire_webhook_without_a_notifier_is_a_no_op() {
        let rt = runtime();
        let event = WebhookEvent {
            kind: "test".into(),
            subject: "s".into(),
            detail: serde_json::json!({}),
        };
        assert!(!rt.fire_webhook(event).await.unwrap());
    }

    #[test]
    fn alter_outbound_replaces_the_handler_under_the_same_tag() {
        let rt = runtime();
        rt.add_outbound(Arc::new(FakeOutbound { tag: "direct".into() })).unwrap();
        rt.alter_outbound(Arc::new(FakeOutbound { tag: "direct".into() })).unwrap();
        assert_eq!(rt.list_outbounds(), vec!["direct".to_string()]);
    }

    #[test]
    fn users_are_scoped_per_inbound() {
        let rt = runtime();
        assert!(rt.add_user("in1", "a@example.com"));
        assert!(!rt.add_user("in1", "a@example.com"));
        assert!(rt.add_user("in1", "b@example.com"));
        assert_eq!(rt.get_inbound_users_count("in1"), 2);
        assert_eq!(rt.get_inbound_users_count("in2"), 0);
        assert!(rt.remove_user("in1", "a@example.com"));
        assert_eq!(rt.get_inbound_users_count("in1"), 1);
    }

    #[test]
    fn balancer_override_round_trips_through_the_dispatcher() {
        use junction_balance::RoundRobinStrategy;
        let rt = runtime();
        let balancer = Arc::new(Balancer::new("lb", Box::new(RoundRobinStrategy::default())));
        rt.add_balancer(balancer);
        assert_eq!(rt.get_balancers(), vec!["lb".to_string()]);
        assert_eq!(rt.get_override_target("lb"), None);
        rt.set_override_target("lb", Some("node-a".into())).unwrap();
        assert_eq!(rt.get_override_target("lb"), Some("node-a".to_string()));
        assert!(rt.set_override_target("ghost", None).is_err());
    }

    #[test]
    fn rule_alter_is_an_upsert_by_tag() {
        use junction_router::Rule;
        let always_match = |_: &junction_router::RoutingContext| true;
        let rt = runtime();
        let rule = Rule::new("r1", RuleTarget::Static("a".into()), vec![Box::new(always_match)]).unwrap();
        rt.add_rule(rule);
        assert_eq!(rt.get_rule("r1").unwrap().1, RuleTarget::Static("a".into()));

        let replacement = Rule::new("r1", RuleTarget::Static("b".into()), vec![Box::new(always_match)]).unwrap();
        rt.alter_rule(replacement);
        assert_eq!(rt.router.rule_count(), 1);
        assert_eq!(rt.get_rule("r1").unwrap().1, RuleTarget::Static("b".into()));
    }

    // Present to document that `Prober`/`Network` stay reachable for a
    // Runtime built with an observatory wired to the dispatcher.
    #[allow(dead_code)]
    fn _type_check(_: &dyn Prober, _: Network) {}
}
