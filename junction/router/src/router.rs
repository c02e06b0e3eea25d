use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use junction_core::{Error, Result};

use crate::cache::RouteCache;
use crate::context::RoutingContext;
use crate::rule::{Route, Rule, RuleTarget};

/// How a `Router` reconciles domain-based rules against IP-based ones
/// when the target arrives as a bare domain name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainStrategy {
    /// Never resolve; IP-only rules simply never match a domain target.
    AsIs,
    /// Resolve and retry only after an as-is pass finds no rule.
    IpIfNonMatch,
    /// Resolve up front, unconditionally, before any rule matching runs.
    IpOnDemand,
}

/// A caller-supplied domain resolver. Kept as a trait rather than a bare
/// closure so it can be shared across clones of a `Router` via `Arc`.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<Vec<IpAddr>>;
}

struct RestrictionState {
    decision: RuleTarget,
    generation: u64,
}

/// Compiles and evaluates routing rules, with an optional route cache and
/// an optional temporary override ("restriction") that short-circuits
/// normal rule matching.
pub struct Router {
    rules: Mutex<Vec<Rule>>,
    cache: Option<Arc<RouteCache>>,
    domain_strategy: DomainStrategy,
    resolver: Option<Arc<dyn DnsResolver>>,
    default_target: Mutex<Option<RuleTarget>>,
    restriction: Arc<Mutex<Option<RestrictionState>>>,
    restriction_generation: AtomicU64,
}

impl Router {
    pub fn new(domain_strategy: DomainStrategy) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            cache: None,
            domain_strategy,
            resolver: None,
            default_target: Mutex::new(None),
            restriction: Arc::new(Mutex::new(None)),
            restriction_generation: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: Arc<RouteCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DnsResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn set_default_target(&self, target: Option<RuleTarget>) {
        *self.default_target.lock() = target;
    }

    pub fn default_target(&self) -> Option<RuleTarget> {
        self.default_target.lock().clone()
    }

    pub fn append_rule(&self, rule: Rule) {
        self.rules.lock().push(rule);
        self.invalidate_cache();
    }

    /// Upserts `rule` by tag: an existing rule with the same tag is
    /// replaced in place (preserving its position), otherwise `rule` is
    /// appended.
    pub fn alter_rule(&self, rule: Rule) {
        let mut rules = self.rules.lock();
        match rules.iter().position(|r| r.tag == rule.tag) {
            Some(i) => rules[i] = rule,
            None => rules.push(rule),
        }
        drop(rules);
        self.invalidate_cache();
    }

    pub fn replace_rules(&self, rules: Vec<Rule>) {
        *self.rules.lock() = rules;
        self.invalidate_cache();
    }

    pub fn remove_rule(&self, tag: &str) -> bool {
        let mut rules = self.rules.lock();
        let before = rules.len();
        rules.retain(|r| r.tag != tag);
        let removed = rules.len() != before;
        drop(rules);
        if removed {
            self.invalidate_cache();
        }
        removed
    }

    pub fn rule_count(&self) -> usize {
        self.rules.lock().len()
    }

    /// `(tag, target, group_tags)` for every compiled rule, in match
    /// order. Matchers themselves aren't introspectable through this —
    /// only the decision each rule resolves to and how it's labeled.
    pub fn rule_summaries(&self) -> Vec<(String, RuleTarget, Vec<String>)> {
        self.rules
            .lock()
            .iter()
            .map(|r| (r.tag.clone(), r.target.clone(), r.groups.clone()))
            .collect()
    }

    pub fn rule_summary(&self, tag: &str) -> Option<(String, RuleTarget, Vec<String>)> {
        self.rules
            .lock()
            .iter()
            .find(|r| r.tag == tag)
            .map(|r| (r.tag.clone(), r.target.clone(), r.groups.clone()))
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Forces every lookup to `decision` until `clear_restriction` is
    /// called or, if `ttl` is set, until it elapses on its own.
    pub fn set_restriction(&self, decision: RuleTarget, ttl: Option<Duration>) {
        let generation = self.restriction_generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.restriction.lock() = Some(RestrictionState {
            decision: decision.clone(),
            generation,
        });
        if let Some(ttl) = ttl {
            let restriction = self.restriction.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let mut guard = restriction.lock();
                if matches!(guard.as_ref(), Some(r) if r.generation == generation) {
                    *guard = None;
                }
            });
        }
    }

    pub fn clear_restriction(&self) {
        self.restriction_generation.fetch_add(1, Ordering::SeqCst);
        *self.restriction.lock() = None;
    }

    pub fn is_restricted(&self) -> bool {
        self.restriction.lock().is_some()
    }

    fn active_restriction(&self) -> Option<RuleTarget> {
        self.restriction.lock().as_ref().map(|r| r.decision.clone())
    }

    fn match_rules(&self, ctx: &RoutingContext) -> Option<Route> {
        let rules = self.rules.lock();
        rules.iter().find(|r| r.matches(ctx)).map(|r| Route {
            decision: r.target.clone(),
            rule_tag: Some(r.tag.clone()),
            group_tags: r.groups.clone(),
        })
    }

    async fn resolve_if_needed(&self, ctx: &mut RoutingContext) -> Result<bool> {
        if ctx.skip_dns || ctx.target_domain.is_none() || !ctx.target_ips.is_empty() {
            return Ok(false);
        }
        let Some(resolver) = &self.resolver else {
            return Ok(false);
        };
        let domain = ctx.target_domain.clone().expect("checked above");
        let ips = resolver.resolve(&domain).await?;
        let resolved = !ips.is_empty();
        ctx.attach_resolved_ips(ips);
        Ok(resolved)
    }

    fn cache_if_eligible(&self, ctx: &RoutingContext, route: &Route) {
        if let Some(cache) = &self.cache {
            cache.put(ctx.cache_key(), route.decision.clone(), route.rule_tag.clone());
        }
    }

    /// Implements the full lookup order: restriction, cache, rule match
    /// (with on-demand resolution when the strategy calls for it), a
    /// resolve-and-retry fallback, then the configured default.
    pub async fn pick_route(&self, ctx: &mut RoutingContext) -> Result<Route> {
        if let Some(decision) = self.active_restriction() {
            return Ok(Route {
                decision,
                rule_tag: None,
                group_tags: Vec::new(),
            });
        }

        if let Some(cache) = &self.cache {
            let key = ctx.cache_key();
            if let Some((decision, rule_tag)) = cache.get(&key) {
                return Ok(Route {
                    decision,
                    rule_tag,
                    group_tags: Vec::new(),
                });
            }
        }

        if self.domain_strategy == DomainStrategy::IpOnDemand {
            self.resolve_if_needed(ctx).await?;
        }

        if let Some(route) = self.match_rules(ctx) {
            self.cache_if_eligible(ctx, &route);
            return Ok(route);
        }

        if self.domain_strategy == DomainStrategy::IpIfNonMatch && self.resolve_if_needed(ctx).await? {
            if let Some(route) = self.match_rules(ctx) {
                self.cache_if_eligible(ctx, &route);
                return Ok(route);
            }
        }

        self.default_target
            .lock()
            .clone()
            .map(|decision| Route {
                decision,
                rule_tag: None,
                group_tags: Vec::new(),
            })
            .ok_or(Error::NoClue)
    }
}
