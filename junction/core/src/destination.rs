use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

/// The network a [`Destination`] is reached over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Network {
    Tcp,
    Udp,
    Unix,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Tcp => "tcp",
            Network::Udp => "udp",
            Network::Unix => "unix",
        })
    }
}

/// The address half of a [`Destination`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Address {
    Ip(IpAddr),
    Domain(String),
    Unix(PathBuf),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip(ip) => write!(f, "{ip}"),
            Address::Domain(d) => write!(f, "{d}"),
            Address::Unix(p) => write!(f, "{}", p.display()),
        }
    }
}

impl Address {
    pub fn domain(&self) -> Option<&str> {
        match self {
            Address::Domain(d) => Some(d.as_str()),
            _ => None,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Address::Ip(ip) => Some(*ip),
            _ => None,
        }
    }
}

/// `(address, port, network)` — the target of a connection or a flow.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    pub address: Address,
    pub port: u16,
    pub network: Network,
}

impl Destination {
    pub fn new(address: Address, port: u16, network: Network) -> Self {
        Self {
            address,
            port,
            network,
        }
    }

    pub fn tcp(address: Address, port: u16) -> Self {
        Self::new(address, port, Network::Tcp)
    }

    pub fn udp(address: Address, port: u16) -> Self {
        Self::new(address, port, Network::Udp)
    }

    /// The cache key component used by the route cache: `"target-string"`.
    pub fn target_string(&self) -> String {
        self.address.to_string()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.address, self.port, self.network)
    }
}
