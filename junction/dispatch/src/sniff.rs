use junction_core::Destination;

/// What a successful sniff produced: the protocol name it recognized,
/// and (for protocols that carry their own destination, like HTTP
/// CONNECT or SNI-bearing TLS) a destination to route on instead of the
/// connection's original dial target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SniffResult {
    pub protocol: String,
    pub rewritten_destination: Option<Destination>,
}

impl SniffResult {
    pub fn protocol_only(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            rewritten_destination: None,
        }
    }
}

/// One protocol detector, tried in registration order against however
/// many bytes have arrived so far. Detectors that need more bytes than
/// they were given return `None` rather than guessing — the dispatcher
/// re-invokes the registry as more data arrives, up to a byte budget.
pub trait Sniffer: Send + Sync {
    fn sniff(&self, buf: &[u8]) -> Option<SniffResult>;

    fn name(&self) -> &'static str;
}

pub struct TlsSniffer;

impl Sniffer for TlsSniffer {
    fn sniff(&self, buf: &[u8]) -> Option<SniffResult> {
        junction_vision::looks_like_tls_client_hello(buf).then(|| SniffResult::protocol_only("tls"))
    }

    fn name(&self) -> &'static str {
        "tls"
    }
}

pub struct HttpSniffer;

const METHODS: &[&str] = &["GET ", "POST ", "PUT ", "HEAD ", "DELETE ", "OPTIONS ", "PATCH ", "CONNECT "];

impl Sniffer for HttpSniffer {
    fn sniff(&self, buf: &[u8]) -> Option<SniffResult> {
        let text = std::str::from_utf8(buf).ok()?;
        METHODS
            .iter()
            .any(|m| text.starts_with(m))
            .then(|| SniffResult::protocol_only("http"))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Illustrates that the registry is a genuinely open set, not a fixed
/// handful of hardcoded cases — recognizes an SSH version banner.
pub struct SshBannerSniffer;

impl Sniffer for SshBannerSniffer {
    fn sniff(&self, buf: &[u8]) -> Option<SniffResult> {
        buf.starts_with(b"SSH-").then(|| SniffResult::protocol_only("ssh"))
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}

/// An ordered, appendable set of sniffers, tried until one matches.
#[derive(Default)]
pub struct SnifferRegistry {
    sniffers: Vec<Box<dyn Sniffer>>,
}

impl SnifferRegistry {
    pub fn new() -> Self {
        Self { sniffers: Vec::new() }
    }

    /// The registry most deployments would start from: TLS, then HTTP,
    /// then the illustrative SSH banner detector.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TlsSniffer));
        registry.register(Box::new(HttpSniffer));
        registry.register(Box::new(SshBannerSniffer));
        registry
    }

    pub fn register(&mut self, sniffer: Box<dyn Sniffer>) {
        self.sniffers.push(sniffer);
    }

    pub fn sniff(&self, buf: &[u8]) -> Option<SniffResult> {
        self.sniffers.iter().find_map(|s| s.sniff(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_http_request_line() {
        let registry = SnifferRegistry::with_defaults();
        let result = registry.sniff(b"GET / HTTP/1.1\r\n").unwrap();
        assert_eq!(result.protocol, "http");
    }

    #[test]
    fn recognizes_ssh_banner() {
        let registry = SnifferRegistry::with_defaults();
        let result = registry.sniff(b"SSH-2.0-OpenSSH_9.6\r\n").unwrap();
        assert_eq!(result.protocol, "ssh");
    }

    #[test]
    fn unrecognized_bytes_fall_through_to_none() {
        let registry = SnifferRegistry::with_defaults();
        assert!(registry.sniff(b"\x00\x01\x02\x03").is_none());
    }

    #[test]
    fn first_registered_match_wins() {
        let mut registry = SnifferRegistry::new();
        registry.register(Box::new(HttpSniffer));
        registry.register(Box::new(SshBannerSniffer));
        // "SSH-..." never matches HttpSniffer, so this still reaches SshBannerSniffer.
        assert_eq!(registry.sniff(b"SSH-2.0-x").unwrap().protocol, "ssh");
    }
}
