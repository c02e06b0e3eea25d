//! Rule-based routing: matcher conditions, rule compilation, a sharded
//! route cache, and the `Router` that ties them together. Grounded on the
//! teacher's `linkerd2-router`/`linkerd2-cache`/`linkerd2-addr` crates,
//! generalized from HTTP-destination routing to the multi-matcher rule
//! model this system needs.

pub mod cache;
pub mod condition;
pub mod context;
pub mod matchers;
pub mod rule;
pub mod router;

pub use cache::RouteCache;
pub use condition::Condition;
pub use context::{CacheKey, RoutingContext};
pub use rule::{Route, Rule, RuleTarget};
pub use router::{DnsResolver, DomainStrategy, Router};
