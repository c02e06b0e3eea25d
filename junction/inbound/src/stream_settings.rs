use std::io;
use std::net::SocketAddr;

use tokio::net::TcpStream;

/// Socket-level tuning for a listener's accepted connections, orthogonal
/// to the (address, transport) pair a `BindAddress` describes: the knobs
/// a transparent-proxy deployment needs that plain `bind`/`accept` don't
/// give you.
#[derive(Clone, Debug, Default)]
pub struct StreamSettings {
    /// `SO_MARK` (fwmark) applied to this listener's socket, so a paired
    /// `iptables`/`nftables` policy-routing rule can steer its traffic
    /// independently of everything else on the host.
    pub mark: Option<u32>,
    /// `IP_TRANSPARENT`: lets the listener accept connections addressed
    /// to an IP it doesn't itself own — the listener-side counterpart to
    /// an iptables `TPROXY` target redirecting traffic here.
    pub tproxy: bool,
    /// Recover the connection's pre-NAT destination via `SO_ORIGINAL_DST`
    /// rather than trusting a statically configured one, for listeners
    /// fed by an iptables `REDIRECT`/`TPROXY` rule instead of a client
    /// that dialed the listener's own address directly.
    pub receive_original_destination: bool,
}

impl StreamSettings {
    pub fn with_mark(mut self, mark: u32) -> Self {
        self.mark = Some(mark);
        self
    }

    pub fn with_tproxy(mut self, enabled: bool) -> Self {
        self.tproxy = enabled;
        self
    }

    pub fn with_receive_original_destination(mut self, enabled: bool) -> Self {
        self.receive_original_destination = enabled;
        self
    }

    pub fn is_default(&self) -> bool {
        self.mark.is_none() && !self.tproxy && !self.receive_original_destination
    }

    /// Applies `mark`/`tproxy` to `socket` before it's bound. Must run
    /// before `bind()`: `IP_TRANSPARENT` has no effect set afterward.
    #[cfg(target_os = "linux")]
    pub fn apply(&self, socket: &socket2::Socket) -> io::Result<()> {
        if let Some(mark) = self.mark {
            socket.set_mark(mark)?;
        }
        if self.tproxy {
            socket.set_ip_transparent(true)?;
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    pub fn apply(&self, _socket: &socket2::Socket) -> io::Result<()> {
        if self.mark.is_some() || self.tproxy {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "SO_MARK/IP_TRANSPARENT are only implemented on linux",
            ));
        }
        Ok(())
    }
}

/// Reads the pre-NAT destination off a socket redirected here by
/// iptables `REDIRECT`/`TPROXY`. Only meaningful when the listener was
/// bound with `StreamSettings::receive_original_destination` set; on a
/// socket a client dialed directly this returns the listener's own
/// address, which is harmless but useless.
#[cfg(target_os = "linux")]
pub fn recover_original_destination(stream: &TcpStream) -> io::Result<SocketAddr> {
    use std::mem;
    use std::os::fd::AsRawFd;

    // Not in the `libc` crate's own bindings: it's a netfilter ABI
    // constant from <linux/netfilter_ipv4.h>, not libc/socket.h.
    const SO_ORIGINAL_DST: libc::c_int = 80;

    let fd = stream.as_raw_fd();
    match stream.local_addr()? {
        SocketAddr::V4(_) => {
            let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
            let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            let rc = unsafe {
                libc::getsockopt(
                    fd,
                    libc::SOL_IP,
                    SO_ORIGINAL_DST,
                    &mut raw as *mut _ as *mut libc::c_void,
                    &mut len,
                )
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            let ip = std::net::Ipv4Addr::from(u32::from_be(raw.sin_addr.s_addr));
            Ok(SocketAddr::from((ip, u16::from_be(raw.sin_port))))
        }
        SocketAddr::V6(_) => {
            // ip6tables' counterpart carries the same option number under
            // SOL_IPV6 rather than SOL_IP.
            let mut raw: libc::sockaddr_in6 = unsafe { mem::zeroed() };
            let mut len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
            let rc = unsafe {
                libc::getsockopt(
                    fd,
                    libc::SOL_IPV6,
                    SO_ORIGINAL_DST,
                    &mut raw as *mut _ as *mut libc::c_void,
                    &mut len,
                )
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            let ip = std::net::Ipv6Addr::from(raw.sin6_addr.s6_addr);
            Ok(SocketAddr::from((ip, u16::from_be(raw.sin6_port))))
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn recover_original_destination(_stream: &TcpStream) -> io::Result<SocketAddr> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_ORIGINAL_DST recovery is only implemented on linux",
    ))
}
