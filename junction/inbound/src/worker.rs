use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UdpSocket, UnixListener};
use tracing::{instrument, warn};

use junction_task::DoneBeacon;

use crate::handler::ConnectionHandler;
use crate::nat::NatTable;
use crate::socket_factory::SocketFactory;
use crate::stream_settings::{self, StreamSettings};

/// Accepts TCP connections on one listener and hands each to the
/// configured handler on its own task.
pub struct TcpWorker {
    beacon: DoneBeacon,
}

impl TcpWorker {
    pub fn spawn(listener: TcpListener, inbound_tag: String, handler: Arc<dyn ConnectionHandler>) -> Self {
        Self::spawn_with_settings(listener, inbound_tag, handler, StreamSettings::default())
    }

    pub fn spawn_with_settings(
        listener: TcpListener,
        inbound_tag: String,
        handler: Arc<dyn ConnectionHandler>,
        settings: StreamSettings,
    ) -> Self {
        let beacon = DoneBeacon::new();
        let loop_beacon = beacon.clone();
        tokio::spawn(accept_loop(listener, inbound_tag, handler, settings, loop_beacon));
        Self { beacon }
    }

    pub fn close(&self) {
        self.beacon.close();
    }
}

#[instrument(skip(listener, handler, settings, beacon), fields(inbound_tag = %inbound_tag))]
async fn accept_loop(
    listener: TcpListener,
    inbound_tag: String,
    handler: Arc<dyn ConnectionHandler>,
    settings: StreamSettings,
    beacon: DoneBeacon,
) {
    loop {
        tokio::select! {
            _ = beacon.closed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let original_destination = if settings.receive_original_destination {
                            match stream_settings::recover_original_destination(&stream) {
                                Ok(addr) => Some(addr),
                                Err(e) => {
                                    warn!(error = %e, "failed to recover original destination");
                                    None
                                }
                            }
                        } else {
                            None
                        };
                        let handler = handler.clone();
                        let tag = inbound_tag.clone();
                        tokio::spawn(async move { handler.handle_tcp(stream, peer, &tag, original_destination).await; });
                    }
                    Err(e) => warn!(error = %e, "tcp accept failed"),
                }
            }
        }
    }
}

pub struct UnixWorker {
    beacon: DoneBeacon,
}

impl UnixWorker {
    pub fn spawn(listener: UnixListener, inbound_tag: String, handler: Arc<dyn ConnectionHandler>) -> Self {
        let beacon = DoneBeacon::new();
        let loop_beacon = beacon.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_beacon.closed() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _addr)) => {
                                let handler = handler.clone();
                                let tag = inbound_tag.clone();
                                tokio::spawn(async move { handler.handle_unix(stream, &tag).await; });
                            }
                            Err(e) => warn!(error = %e, "unix accept failed"),
                        }
                    }
                }
            }
        });
        Self { beacon }
    }

    pub fn close(&self) {
        self.beacon.close();
    }
}

/// Reads datagrams off a UDP socket, tracks per-client sessions in a
/// `NatTable`, and writes back whatever reply the handler produces.
pub struct UdpWorker {
    beacon: DoneBeacon,
    nat: Arc<NatTable<()>>,
}

impl UdpWorker {
    pub fn spawn(
        socket: UdpSocket,
        inbound_tag: String,
        handler: Arc<dyn ConnectionHandler>,
        cone: bool,
        cleanup_interval: Duration,
        idle_timeout: Duration,
    ) -> Self {
        let beacon = DoneBeacon::new();
        let nat = Arc::new(NatTable::<()>::new(cone));
        nat.start_cleanup(cleanup_interval, idle_timeout);

        let socket = Arc::new(socket);
        let loop_beacon = beacon.clone();
        let loop_nat = nat.clone();
        tokio::spawn(async move {
            let local = socket.local_addr().ok();
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                tokio::select! {
                    _ = loop_beacon.closed() => break,
                    received = socket.recv_from(&mut buf) => {
                        let (n, peer) = match received {
                            Ok(pair) => pair,
                            Err(e) => { warn!(error = %e, "udp recv failed"); continue; }
                        };
                        let Some(local) = local else { continue };
                        let (_, is_new) = loop_nat.get_or_create(peer, local, || ());
                        let reply = handler
                            .handle_udp_datagram(&buf[..n], peer, local, &inbound_tag, is_new)
                            .await;
                        if let Some(reply) = reply {
                            if let Err(e) = socket.send_to(&reply, peer).await {
                                warn!(error = %e, "udp send failed");
                            }
                        }
                    }
                }
            }
        });

        Self { beacon, nat }
    }

    pub fn session_count(&self) -> usize {
        self.nat.len()
    }

    pub async fn close(&self) {
        self.beacon.close();
        self.nat.close().await;
    }
}

/// A listening address, covering all three transports a receiver can
/// bind to. `Tcp`'s settings default to plain binding; build one with
/// `StreamSettings::with_mark`/`with_tproxy`/`with_receive_original_destination`
/// for a TPROXY/REDIRECT-fed listener.
#[derive(Clone, Debug)]
pub enum BindAddress {
    Tcp(SocketAddr, StreamSettings),
    Udp(SocketAddr),
    Unix(PathBuf),
}

impl BindAddress {
    pub fn tcp(addr: SocketAddr) -> Self {
        Self::Tcp(addr, StreamSettings::default())
    }
}

pub async fn bind(factory: &dyn SocketFactory, addr: &BindAddress) -> std::io::Result<BoundSocket> {
    match addr {
        BindAddress::Tcp(a, settings) => Ok(BoundSocket::Tcp(factory.bind_tcp(*a, settings).await?)),
        BindAddress::Udp(a) => Ok(BoundSocket::Udp(factory.bind_udp(*a).await?)),
        BindAddress::Unix(p) => Ok(BoundSocket::Unix(factory.bind_unix(p).await?)),
    }
}

pub enum BoundSocket {
    Tcp(TcpListener),
    Udp(UdpSocket),
    Unix(UnixListener),
}
