//! Outbound balancing strategies, grounded on the teacher's
//! `proxy/tcp/balance.rs` load-balanced endpoint stack and `fallback`
//! combinator, generalized from HTTP endpoint balancing to tagged
//! outbound selection.

pub mod balancer;
pub mod candidate;
pub mod least_load;
pub mod strategy;

pub use balancer::Balancer;
pub use candidate::Candidate;
pub use least_load::LeastLoadStrategy;
pub use strategy::{BalancingStrategy, LeastPingStrategy, RandomStrategy, RoundRobinStrategy};
