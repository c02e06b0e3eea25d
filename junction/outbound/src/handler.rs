use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use junction_core::{Destination, Result};

/// A boxed, type-erased duplex stream — what every outbound handler
/// hands back regardless of the concrete transport it dials.
pub type BoxedStream = Box<dyn AsyncReadWrite>;

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncReadWrite for T {}

/// One way of reaching the network: direct dial, a chained proxy, a
/// reject/block sink, and so on. The concrete wire protocol stays out of
/// scope here — an implementation just needs to produce a duplex stream
/// for `destination`.
#[async_trait]
pub trait OutboundHandler: Send + Sync {
    fn tag(&self) -> &str;

    async fn dial(&self, destination: &Destination) -> Result<BoxedStream>;
}
