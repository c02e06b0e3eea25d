//! A minimal, directly-mapped configuration loader: TOML in, `Config`
//! out. Parsing a richer schema (named rule conditions, geo datasets,
//! probe selectors) stays out of scope — this is just enough to
//! construct a `Runtime` for the demonstration binary.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inbounds: Vec<InboundConfig>,
    #[serde(default)]
    pub outbounds: Vec<OutboundConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub observatory: Option<ObservatoryConfig>,
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundConfig {
    pub tag: String,
    pub listen: SocketAddr,
    #[serde(default)]
    pub network: NetworkKind,
    pub destination_host: String,
    pub destination_port: u16,
    #[serde(default)]
    pub stream_settings: StreamSettingsConfig,
}

/// TCP-only transparent-proxy tuning, ignored for UDP inbounds. Mirrors
/// `junction_inbound::StreamSettings` field-for-field rather than
/// reusing it directly, so this module stays the only one that needs to
/// know the on-disk config shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamSettingsConfig {
    #[serde(default)]
    pub mark: Option<u32>,
    #[serde(default)]
    pub tproxy: bool,
    #[serde(default)]
    pub receive_original_destination: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboundConfig {
    pub tag: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub domain_strategy: DomainStrategyKind,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            domain_strategy: DomainStrategyKind::AsIs,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DomainStrategyKind {
    AsIs,
    IpIfNonMatch,
    IpOnDemand,
}

impl Default for DomainStrategyKind {
    fn default() -> Self {
        Self::AsIs
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "CacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "CacheConfig::default_enabled")]
    pub enabled: bool,
}

impl CacheConfig {
    fn default_max_entries() -> usize {
        4096
    }

    fn default_ttl_secs() -> u64 {
        300
    }

    fn default_enabled() -> bool {
        true
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: Self::default_max_entries(),
            ttl_secs: Self::default_ttl_secs(),
            enabled: Self::default_enabled(),
        }
    }
}

/// Timeout knobs handed to a [`junction_core::Policy`]; unset fields keep
/// the policy's own defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PolicyConfig {
    pub handshake_secs: Option<u64>,
    pub connection_idle_secs: Option<u64>,
}

impl PolicyConfig {
    pub fn to_policy(self) -> junction_core::Policy {
        let mut policy = junction_core::Policy::default();
        if let Some(secs) = self.handshake_secs {
            policy.handshake = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = self.connection_idle_secs {
            policy.connection_idle = std::time::Duration::from_secs(secs);
        }
        policy
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservatoryConfig {
    #[serde(default = "ObservatoryConfig::default_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default)]
    pub parallel: bool,
}

impl ObservatoryConfig {
    fn default_interval_secs() -> u64 {
        10
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "WebhookConfig::default_dedup_secs")]
    pub dedup_seconds: u64,
}

impl WebhookConfig {
    fn default_dedup_secs() -> u64 {
        60
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let toml = r#"
            [[inbounds]]
            tag = "in1"
            listen = "127.0.0.1:10080"
            destination_host = "example.com"
            destination_port = 443

            [[outbounds]]
            tag = "direct"
            is_default = true
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.inbounds.len(), 1);
        assert_eq!(cfg.router.domain_strategy, DomainStrategyKind::AsIs);
        assert_eq!(cfg.cache.max_entries, 4096);
        assert!(cfg.observatory.is_none());
        assert!(!cfg.inbounds[0].stream_settings.tproxy);
        assert_eq!(cfg.inbounds[0].stream_settings.mark, None);
    }

    #[test]
    fn stream_settings_parse_when_present() {
        let toml = r#"
            [[inbounds]]
            tag = "tproxy-in"
            listen = "0.0.0.0:12345"
            destination_host = "example.com"
            destination_port = 443

            [inbounds.stream_settings]
            mark = 255
            tproxy = true
            receive_original_destination = true
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        let settings = &cfg.inbounds[0].stream_settings;
        assert_eq!(settings.mark, Some(255));
        assert!(settings.tproxy);
        assert!(settings.receive_original_destination);
    }
}
