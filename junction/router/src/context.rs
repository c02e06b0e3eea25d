use std::collections::HashMap;
use std::net::IpAddr;

use junction_core::Network;

/// A read-only-in-spirit view of a session at match time. The domain
/// resolution step (`DomainStrategy::IpIfNonMatch`/`IpOnDemand`) is the
/// one exception that mutates it, attaching resolved IPs so a second
/// matcher pass can see them.
#[derive(Clone, Debug)]
pub struct RoutingContext {
    pub inbound_tag: String,
    pub source_ip: Option<IpAddr>,
    pub source_port: u16,
    pub target_domain: Option<String>,
    pub target_ips: Vec<IpAddr>,
    pub target_port: u16,
    pub local_ip: Option<IpAddr>,
    pub local_port: u16,
    pub network: Network,
    pub sniffed_protocol: Option<String>,
    pub user_email: Option<String>,
    pub attributes: HashMap<String, String>,
    pub skip_dns: bool,
}

impl RoutingContext {
    pub fn new(network: Network) -> Self {
        Self {
            inbound_tag: String::new(),
            source_ip: None,
            source_port: 0,
            target_domain: None,
            target_ips: Vec::new(),
            target_port: 0,
            local_ip: None,
            local_port: 0,
            network,
            sniffed_protocol: None,
            user_email: None,
            attributes: HashMap::new(),
            skip_dns: false,
        }
    }

    pub fn target_ip(&self) -> Option<IpAddr> {
        self.target_ips.first().copied()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(&key.to_lowercase()).map(|s| s.as_str())
    }

    /// The cache key: `(target-string, target-port, network, inbound-tag,
    /// sniffed-protocol, user-id)`.
    pub fn cache_key(&self) -> CacheKey {
        let target_string = self
            .target_domain
            .clone()
            .or_else(|| self.target_ip().map(|ip| ip.to_string()))
            .unwrap_or_default();
        CacheKey {
            target_string,
            target_port: self.target_port,
            network: self.network,
            inbound_tag: self.inbound_tag.clone(),
            sniffed_protocol: self.sniffed_protocol.clone(),
            user_id: self.user_email.clone(),
        }
    }

    pub fn attach_resolved_ips(&mut self, ips: Vec<IpAddr>) {
        self.target_ips = ips;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub target_string: String,
    pub target_port: u16,
    pub network: Network,
    pub inbound_tag: String,
    pub sniffed_protocol: Option<String>,
    pub user_id: Option<String>,
}
