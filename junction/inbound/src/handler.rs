use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpStream, UnixStream};

/// What an inbound worker does with a freshly-accepted connection or
/// datagram. Implemented by the dispatcher; workers know nothing about
/// routing, sniffing, or outbounds — only how to get bytes off a socket.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// `original_destination` carries the pre-NAT address recovered via
    /// `SO_ORIGINAL_DST` when the inbound was bound with
    /// `StreamSettings::receive_original_destination` set; `None` for
    /// every other inbound.
    async fn handle_tcp(&self, stream: TcpStream, peer: SocketAddr, inbound_tag: &str, original_destination: Option<SocketAddr>);

    async fn handle_unix(&self, stream: UnixStream, inbound_tag: &str);

    /// Returns a reply to write back to `peer`, if any. `is_new_session`
    /// tells the handler whether this datagram started a fresh NAT
    /// mapping, so it can decide whether to spin up new per-session
    /// state or reuse what it already has.
    async fn handle_udp_datagram(
        &self,
        data: &[u8],
        peer: SocketAddr,
        local: SocketAddr,
        inbound_tag: &str,
        is_new_session: bool,
    ) -> Option<Vec<u8>>;
}
