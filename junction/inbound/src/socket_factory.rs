use std::io;
use std::net::SocketAddr;
use std::path::Path;

use async_trait::async_trait;
use socket2::{Domain, Socket, Type};
use tokio::net::{TcpListener, UdpSocket, UnixListener};

use crate::stream_settings::StreamSettings;

/// Every place a worker would otherwise call `TcpListener::bind` et al.
/// goes through this seam instead, following the teacher's `app/inbound`
/// endpoint construction — tests substitute a factory that always binds
/// to loopback on an ephemeral port rather than touching real interface
/// configuration.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn bind_tcp(&self, addr: SocketAddr, settings: &StreamSettings) -> io::Result<TcpListener>;
    async fn bind_udp(&self, addr: SocketAddr) -> io::Result<UdpSocket>;
    async fn bind_unix(&self, path: &Path) -> io::Result<UnixListener>;
}

const LISTEN_BACKLOG: i32 = 1024;

/// Builds, tunes, binds, and listens on a raw socket, then hands back a
/// tokio listener. Split out of `SystemSocketFactory::bind_tcp` since
/// `IP_TRANSPARENT` has to land before `bind()`, which rules out starting
/// from `TcpListener::bind` and tuning the fd afterward.
fn bind_tcp_with_settings(addr: SocketAddr, settings: &StreamSettings) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    settings.apply(&socket)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

/// The default factory: binds exactly where it's told.
#[derive(Default)]
pub struct SystemSocketFactory;

#[async_trait]
impl SocketFactory for SystemSocketFactory {
    async fn bind_tcp(&self, addr: SocketAddr, settings: &StreamSettings) -> io::Result<TcpListener> {
        if settings.is_default() {
            return TcpListener::bind(addr).await;
        }
        bind_tcp_with_settings(addr, settings)
    }

    async fn bind_udp(&self, addr: SocketAddr) -> io::Result<UdpSocket> {
        UdpSocket::bind(addr).await
    }

    async fn bind_unix(&self, path: &Path) -> io::Result<UnixListener> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        UnixListener::bind(path)
    }
}

/// Always binds TCP/UDP to loopback on an OS-assigned port, ignoring the
/// requested address's port (and host, for safety in tests) and any
/// stream settings, since TPROXY/mark have no meaning on loopback. Unix
/// binding is passed through unchanged since there's no analogous
/// "ephemeral" concept for filesystem sockets.
#[derive(Default)]
pub struct LoopbackSocketFactory;

#[async_trait]
impl SocketFactory for LoopbackSocketFactory {
    async fn bind_tcp(&self, _addr: SocketAddr, _settings: &StreamSettings) -> io::Result<TcpListener> {
        TcpListener::bind(("127.0.0.1", 0)).await
    }

    async fn bind_udp(&self, _addr: SocketAddr) -> io::Result<UdpSocket> {
        UdpSocket::bind(("127.0.0.1", 0)).await
    }

    async fn bind_unix(&self, path: &Path) -> io::Result<UnixListener> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        UnixListener::bind(path)
    }
}
