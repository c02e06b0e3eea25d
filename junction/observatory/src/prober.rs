use std::time::Duration;

use async_trait::async_trait;

use junction_core::Result;

/// Dials an outbound and reports round-trip latency. Implemented by
/// whoever owns a live dispatcher — the observatory itself never touches
/// a socket, matching the router/balance split where resolution is
/// deferred to the one component that depends on both sides.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, outbound_tag: &str) -> Result<Duration>;
}
