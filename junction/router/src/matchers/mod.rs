pub mod attribute;
pub mod domain;
pub mod ip;
pub mod membership;
pub mod network;
pub mod port;

pub use attribute::AttributeMatcher;
pub use domain::{DomainMatchType, DomainMatcher};
pub use ip::{IpMatcher, IpRole};
pub use membership::{InboundTagMatcher, ProtocolMatcher, UserMatcher};
pub use network::NetworkMatcher;
pub use port::{PortMatcher, PortRole};
