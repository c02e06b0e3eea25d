//! The one concrete outbound this binary ships: a direct dial using the
//! destination as given, no further proxying. Protocol-specific
//! outbounds (forwarding through another proxy, etc.) are the kind of
//! thing a real deployment registers alongside this one — the registry
//! in `junction-outbound` doesn't know or care which concrete type it
//! holds.

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};

use junction_core::{Address, Destination, Error, Network, Result};
use junction_outbound::{BoxedStream, OutboundHandler};

pub struct DirectOutbound {
    tag: String,
}

impl DirectOutbound {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

#[async_trait]
impl OutboundHandler for DirectOutbound {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn dial(&self, destination: &Destination) -> Result<BoxedStream> {
        match destination.network {
            Network::Tcp => {
                let host = match &destination.address {
                    Address::Ip(ip) => ip.to_string(),
                    Address::Domain(d) => d.clone(),
                    Address::Unix(_) => {
                        return Err(Error::DialFailed("direct outbound cannot dial a unix address over tcp".into()))
                    }
                };
                let stream = TcpStream::connect((host.as_str(), destination.port))
                    .await
                    .map_err(|e| Error::DialFailed(e.to_string()))?;
                Ok(Box::new(stream))
            }
            Network::Udp => {
                let host = match &destination.address {
                    Address::Ip(ip) => ip.to_string(),
                    Address::Domain(d) => d.clone(),
                    Address::Unix(_) => {
                        return Err(Error::DialFailed("direct outbound cannot dial a unix address over udp".into()))
                    }
                };
                let socket = UdpSocket::bind(("0.0.0.0", 0))
                    .await
                    .map_err(|e| Error::DialFailed(e.to_string()))?;
                socket
                    .connect((host.as_str(), destination.port))
                    .await
                    .map_err(|e| Error::DialFailed(e.to_string()))?;
                Ok(Box::new(UdpConnected { socket }))
            }
            Network::Unix => Err(Error::DialFailed("direct outbound does not support unix dials yet".into())),
        }
    }
}

/// Adapts a connected `UdpSocket` to the duplex-stream shape every
/// outbound returns, so the dispatcher's relay code stays transport-
/// agnostic. Reads/writes are single-datagram, matching `send`/`recv` on
/// an already-`connect`ed socket.
struct UdpConnected {
    socket: UdpSocket,
}

impl tokio::io::AsyncRead for UdpConnected {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let unfilled = buf.initialize_unfilled();
        let mut inner = tokio::io::ReadBuf::new(unfilled);
        match self.socket.poll_recv(cx, &mut inner) {
            std::task::Poll::Ready(Ok(())) => {
                let n = inner.filled().len();
                buf.advance(n);
                std::task::Poll::Ready(Ok(()))
            }
            std::task::Poll::Ready(Err(e)) => std::task::Poll::Ready(Err(e)),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

impl tokio::io::AsyncWrite for UdpConnected {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: std::pin::Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: std::pin::Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}
